// src/transport/shell.rs

//! Privileged shell transport
//!
//! Commands run inside one long-lived `su` process. Each command is written
//! to the shell's stdin followed by an `echo` of a unique end marker and the
//! exit status; a reader thread forwards stdout lines over a channel so the
//! per-command timeout is enforced with `recv_timeout`.
//!
//! A shell can start without real elevation (a refused `su` prompt, a
//! restricted `su` binary), so a fresh session is only trusted after
//! `id -u` reports uid 0.

use crate::command::{CommandOutput, CommandRequest};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mode::ExecutionMode;
use crate::transport::Transport;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Mutex, TryLockError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wait_timeout::ChildExt;

/// Command used to confirm elevation
const IDENTITY_COMMAND: &str = "id -u";

/// A running shell process
struct ShellSession {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
}

impl ShellSession {
    fn spawn(shell: &str) -> Result<Self> {
        let mut child = Command::new(shell)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::TransportUnavailable(format!("failed to start {}: {}", shell, e))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            Error::TransportUnavailable("shell stdin was not captured".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::TransportUnavailable("shell stdout was not captured".to_string())
        })?;

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("appwarden-shell-reader".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            child,
            stdin,
            lines: rx,
        })
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Run one command and collect its output up to the end marker
    fn run(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let marker = format!("__APPWARDEN_END_{}__", Uuid::new_v4().simple());
        let script = format!("{} 2>&1 </dev/null\necho \"{} $?\"\n", command, marker);

        self.stdin
            .write_all(script.as_bytes())
            .and_then(|_| self.stdin.flush())
            .map_err(|e| Error::TransportUnavailable(format!("shell session closed: {}", e)))?;

        let deadline = Instant::now() + timeout;
        let mut output = String::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(remaining) {
                Ok(line) => {
                    // Output lacking a trailing newline shares a line with the marker
                    let Some(pos) = line.find(&marker) else {
                        output.push_str(&line);
                        output.push('\n');
                        continue;
                    };

                    output.push_str(&line[..pos]);
                    let status = line[pos + marker.len()..].trim();
                    let exit_code = status.parse::<i32>().map_err(|_| {
                        Error::Protocol(format!("unreadable exit status '{}'", status))
                    })?;
                    return Ok(CommandOutput::new(exit_code, output));
                }
                Err(RecvTimeoutError::Timeout) => return Err(Error::Timeout(timeout.as_secs())),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::TransportUnavailable(
                        "shell session exited".to_string(),
                    ));
                }
            }
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Transport backed by a persistent elevated shell
pub struct RootShell {
    su_path: String,
    timeout: Duration,
    check_timeout: Duration,
    required_uid: u32,
    session: Mutex<Option<ShellSession>>,
    /// Last known grant verdict, `None` until something checked
    granted: Mutex<Option<bool>>,
}

impl RootShell {
    pub fn new(config: &Config) -> Self {
        Self {
            su_path: config.shell.su_path.clone(),
            timeout: config.command_timeout(),
            check_timeout: Duration::from_secs(config.shell.check_timeout_secs),
            required_uid: 0,
            session: Mutex::new(None),
            granted: Mutex::new(None),
        }
    }

    /// Accept sessions running as `uid` instead of root
    ///
    /// Lets an ordinary shell stand in for `su` in tests.
    pub fn with_required_uid(mut self, uid: u32) -> Self {
        self.required_uid = uid;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn set_granted(&self, verdict: bool) {
        *self.granted.lock().unwrap_or_else(|e| e.into_inner()) = Some(verdict);
    }

    /// Start and verify a session
    fn establish(&self) -> Result<ShellSession> {
        info!("Starting privileged shell via {}", self.su_path);
        let mut session = ShellSession::spawn(&self.su_path)?;

        let identity = match session.run(IDENTITY_COMMAND, self.check_timeout) {
            Ok(output) => output,
            // A shell that exits or stalls before answering refused elevation
            Err(Error::TransportUnavailable(_)) | Err(Error::Timeout(_)) => {
                self.set_granted(false);
                return Err(Error::TransportDenied(format!(
                    "{} did not grant an elevated shell",
                    self.su_path
                )));
            }
            Err(e) => return Err(e),
        };

        let uid = identity.output.trim();
        if identity.exit_code != 0 || uid != self.required_uid.to_string() {
            self.set_granted(false);
            return Err(Error::TransportDenied(format!(
                "shell session is not elevated (uid '{}')",
                uid
            )));
        }

        self.set_granted(true);
        debug!("Privileged shell verified");
        Ok(session)
    }

    /// The live session in `slot`, starting one if needed
    fn ready_session<'a>(&self, slot: &'a mut Option<ShellSession>) -> Result<&'a mut ShellSession> {
        if slot.as_mut().is_some_and(|s| !s.is_alive()) {
            warn!("Privileged shell exited, restarting");
            *slot = None;
        }

        if slot.is_none() {
            *slot = Some(self.establish()?);
        }

        slot.as_mut()
            .ok_or_else(|| Error::TransportUnavailable("no shell session".to_string()))
    }

    fn run_in(&self, slot: &mut Option<ShellSession>, request: &CommandRequest) -> Result<CommandOutput> {
        let session = self.ready_session(slot)?;
        debug!("root shell: {}", request);

        let result = session.run(request.command(), self.timeout);
        match result {
            Ok(output) if output.exit_code == 0 => Ok(output),
            Ok(output) => Err(Error::ExecutionFailed {
                code: output.exit_code,
                message: output.output.trim().to_string(),
            }),
            Err(e) => {
                // The session state is unknown after a timeout; start fresh next time
                if matches!(e, Error::Timeout(_) | Error::TransportUnavailable(_)) {
                    warn!("Discarding privileged shell session: {}", e);
                    *slot = None;
                }
                Err(e)
            }
        }
    }
}

impl Transport for RootShell {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Root
    }

    fn is_granted(&self) -> bool {
        // Unknown until an availability check or a session records a verdict
        self.granted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or(false)
    }

    fn request_access(&self) -> Result<()> {
        self.ensure_ready()
    }

    fn is_available(&self) -> bool {
        if which::which(&self.su_path).is_err() {
            debug!("{} not found in PATH", self.su_path);
            return false;
        }

        let mut child = match Command::new(&self.su_path)
            .arg("-c")
            .arg(IDENTITY_COMMAND)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                debug!("Failed to spawn {}: {}", self.su_path, e);
                return false;
            }
        };

        let status = match child.wait_timeout(self.check_timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                debug!("Privilege check timed out");
                let _ = child.kill();
                let _ = child.wait();
                return false;
            }
            Err(e) => {
                debug!("Privilege check failed: {}", e);
                return false;
            }
        };

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout);
        }

        let granted = status.success() && stdout.trim() == self.required_uid.to_string();
        self.set_granted(granted);
        granted
    }

    fn ensure_ready(&self) -> Result<()> {
        let mut slot = self.session.lock().unwrap_or_else(|e| e.into_inner());
        self.ready_session(&mut slot).map(|_| ())
    }

    fn execute(&self, request: &CommandRequest) -> Result<CommandOutput> {
        let mut slot = self.session.lock().unwrap_or_else(|e| e.into_inner());
        self.run_in(&mut slot, request)
    }

    fn try_execute(&self, request: &CommandRequest) -> Result<Option<CommandOutput>> {
        let mut slot = match self.session.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };

        if slot.is_none() {
            return Ok(None);
        }
        self.run_in(&mut slot, request).map(Some)
    }
}
