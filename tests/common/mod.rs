// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use appwarden::transport::Unavailable;
use appwarden::{
    CommandOutput, CommandRequest, Error, ExecutionMode, PolicyValidator, Result, Transport,
    TransportProvider,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// State of one installed package on the fake device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakePackage {
    pub enabled: bool,
    pub ops: HashMap<String, String>,
}

impl Default for FakePackage {
    fn default() -> Self {
        Self {
            enabled: true,
            ops: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct DeviceState {
    packages: BTreeMap<String, FakePackage>,
    sent: Vec<String>,
    /// Permission disappears once this many commands were accepted
    revoke_after: Option<usize>,
    revoked: bool,
}

/// A device that interprets `pm`, `am` and `appops` commands in memory
///
/// Clones share state, so a test keeps one handle for inspection while the
/// gate owns another.
#[derive(Clone)]
pub struct FakeDevice {
    mode: ExecutionMode,
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new(packages: &[&str]) -> Self {
        let mut state = DeviceState::default();
        for name in packages {
            state.packages.insert(name.to_string(), FakePackage::default());
        }
        Self {
            mode: ExecutionMode::Root,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A device whose privilege is already gone
    pub fn revoked(packages: &[&str]) -> Self {
        let device = Self::new(packages);
        device.state.lock().unwrap().revoked = true;
        device
    }

    /// Report `mode` as the transport's mode
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Grant privilege again
    pub fn restore(&self) {
        let mut state = self.state.lock().unwrap();
        state.revoked = false;
        state.revoke_after = None;
    }

    /// Revoke privilege after `n` more commands
    pub fn revoke_after(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        state.revoke_after = Some(state.sent.len() + n);
    }

    pub fn package(&self, name: &str) -> Option<FakePackage> {
        self.state.lock().unwrap().packages.get(name).cloned()
    }

    pub fn set_op(&self, package: &str, op: &str, mode: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(pkg) = state.packages.get_mut(package) {
            pkg.ops.insert(op.to_string(), mode.to_string());
        }
    }

    pub fn set_enabled(&self, package: &str, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(pkg) = state.packages.get_mut(package) {
            pkg.enabled = enabled;
        }
    }

    /// Every command string that reached the device, in order
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Commands that changed state, in order
    pub fn mutations(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|c| !c.starts_with("pm list") && !c.starts_with("appops get"))
            .collect()
    }

    fn denied() -> Error {
        Error::TransportDenied("permission revoked".to_string())
    }
}

fn unknown(package: &str) -> Error {
    Error::ExecutionFailed {
        code: 1,
        message: format!("Unknown package: {}", package),
    }
}

impl DeviceState {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        let last = tokens.last().copied().unwrap_or_default();

        match tokens.as_slice() {
            ["pm", "list", "packages", flag, filter] => {
                let want_enabled = *flag == "-e";
                let listing: String = self
                    .packages
                    .iter()
                    .filter(|(name, pkg)| name.contains(filter) && pkg.enabled == want_enabled)
                    .map(|(name, _)| format!("package:{}\n", name))
                    .collect();
                Ok(CommandOutput::new(0, listing))
            }
            ["pm", "disable-user", ..] => {
                self.packages.get_mut(last).ok_or_else(|| unknown(last))?.enabled = false;
                Ok(CommandOutput::new(
                    0,
                    format!("Package {} new state: disabled-user", last),
                ))
            }
            ["pm", "enable", package] => {
                self.packages.get_mut(*package).ok_or_else(|| unknown(package))?.enabled = true;
                Ok(CommandOutput::new(0, format!("Package {} new state: enabled", package)))
            }
            ["pm", "uninstall", ..] => {
                self.packages.remove(last).ok_or_else(|| unknown(last))?;
                Ok(CommandOutput::new(0, "Success"))
            }
            ["pm", "clear", ..] | ["am", "force-stop", ..] => {
                if !self.packages.contains_key(last) {
                    return Err(unknown(last));
                }
                Ok(CommandOutput::new(0, "Success"))
            }
            ["appops", "set", package, op, mode] => {
                let pkg = self.packages.get_mut(*package).ok_or_else(|| unknown(package))?;
                pkg.ops.insert(op.to_string(), mode.to_string());
                Ok(CommandOutput::default())
            }
            ["appops", "get", package, op] => {
                let pkg = self.packages.get(*package).ok_or_else(|| unknown(package))?;
                let text = match pkg.ops.get(*op) {
                    Some(mode) => format!("{}: {}; time=+1m ago\n", op, mode),
                    None => "No operations.\n".to_string(),
                };
                Ok(CommandOutput::new(0, text))
            }
            ["getprop", ..] => Ok(CommandOutput::new(0, "Fake Device\n")),
            _ => Err(Error::ExecutionFailed {
                code: 127,
                message: format!("unknown command: {}", command),
            }),
        }
    }
}

impl Transport for FakeDevice {
    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn is_granted(&self) -> bool {
        !self.state.lock().unwrap().revoked
    }

    fn request_access(&self) -> Result<()> {
        self.ensure_ready()
    }

    fn is_available(&self) -> bool {
        self.is_granted()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state.lock().unwrap().revoked {
            return Err(Self::denied());
        }
        Ok(())
    }

    fn execute(&self, request: &CommandRequest) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        if state.revoke_after.is_some_and(|n| state.sent.len() >= n) {
            state.revoked = true;
        }
        if state.revoked {
            return Err(Self::denied());
        }

        state.sent.push(request.command().to_string());
        state.run(request.command())
    }

    fn try_execute(&self, request: &CommandRequest) -> Result<Option<CommandOutput>> {
        self.execute(request).map(Some)
    }
}

/// Provider handing out fake devices per mode; missing modes are unavailable
#[derive(Default)]
pub struct FakeProvider {
    devices: HashMap<ExecutionMode, FakeDevice>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, device: FakeDevice) -> Self {
        self.devices.insert(device.mode, device);
        self
    }
}

impl TransportProvider for FakeProvider {
    fn open(&self, mode: ExecutionMode) -> Box<dyn Transport> {
        match self.devices.get(&mode) {
            Some(device) => Box::new(device.clone()),
            None => Box::new(Unavailable),
        }
    }
}

/// Validator protecting exactly `packages`
pub fn validator_protecting(packages: &[&str]) -> PolicyValidator {
    let protected: Vec<String> = packages.iter().map(|p| p.to_string()).collect();
    PolicyValidator::new(Arc::new(move |pkg: &str| protected.iter().any(|p| p == pkg))).unwrap()
}

/// A file-backed database in a temporary directory
///
/// Returns (TempDir, Connection) - keep the TempDir alive to prevent cleanup.
pub fn temp_db() -> (TempDir, rusqlite::Connection) {
    let temp_dir = tempfile::tempdir().unwrap();
    let conn = appwarden::db::open(temp_dir.path().join("appwarden.db")).unwrap();
    (temp_dir, conn)
}

pub fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
