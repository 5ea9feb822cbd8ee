// src/transport/mod.rs

//! Privilege transports
//!
//! A `Transport` carries one command at a time to the operating system under
//! elevated privilege. Two implementations exist:
//!
//! - [`RootShell`]: a long-lived `su` shell session
//! - [`RemoteService`]: an out-of-process helper reached over a Unix socket
//!
//! The session is chosen once by the mode resolver and handed around as a
//! `Box<dyn Transport>`; nothing else in the crate branches on the concrete
//! type. All calls block, so run them off any interactive thread.

pub mod service;
pub mod shell;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

use crate::command::{CommandOutput, CommandRequest};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mode::ExecutionMode;

pub use service::RemoteService;
pub use shell::RootShell;

/// A channel able to run commands with elevated privilege
///
/// Implementations serialize commands internally: the underlying session
/// accepts one in-flight command at a time.
pub trait Transport: Send + Sync {
    /// The mode this transport implements
    fn mode(&self) -> ExecutionMode;

    /// Cheap, non-blocking check whether privilege is currently granted
    ///
    /// Safe to call frequently. May report a stale answer.
    fn is_granted(&self) -> bool;

    /// Actively request or confirm privilege now
    ///
    /// May block on an OS consent prompt; only call on explicit user action.
    fn request_access(&self) -> Result<()>;

    /// One-shot availability check used when no mode is persisted
    fn is_available(&self) -> bool;

    /// Verify the session is usable, establishing it on first use
    ///
    /// The outcome is cached until a call reports mode loss.
    fn ensure_ready(&self) -> Result<()>;

    /// Run one command, waiting at most the per-command timeout
    fn execute(&self, request: &CommandRequest) -> Result<CommandOutput>;

    /// Run a command only if the session is established and idle
    ///
    /// Returns `Ok(None)` instead of waiting behind another command. Meant
    /// for low-priority readers that must not contend with a mutating batch.
    fn try_execute(&self, request: &CommandRequest) -> Result<Option<CommandOutput>>;

    /// Attempt every command in order, even after earlier failures
    fn execute_batch(&self, requests: &[CommandRequest]) -> Vec<Result<CommandOutput>> {
        requests.iter().map(|request| self.execute(request)).collect()
    }
}

/// Builds the transport for a mode
pub trait TransportProvider {
    fn open(&self, mode: ExecutionMode) -> Box<dyn Transport>;
}

/// The real transports, configured from the config file
pub struct SystemTransports {
    config: Config,
}

impl SystemTransports {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl TransportProvider for SystemTransports {
    fn open(&self, mode: ExecutionMode) -> Box<dyn Transport> {
        match mode {
            ExecutionMode::Root => Box::new(RootShell::new(&self.config)),
            ExecutionMode::RemoteService => Box::new(RemoteService::new(&self.config)),
            ExecutionMode::None => Box::new(Unavailable),
        }
    }
}

/// Transport for `ExecutionMode::None`: every call fails
pub struct Unavailable;

impl Unavailable {
    fn error() -> Error {
        Error::TransportUnavailable("no privileged transport is selected".to_string())
    }
}

impl Transport for Unavailable {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::None
    }

    fn is_granted(&self) -> bool {
        false
    }

    fn request_access(&self) -> Result<()> {
        Err(Self::error())
    }

    fn is_available(&self) -> bool {
        false
    }

    fn ensure_ready(&self) -> Result<()> {
        Err(Self::error())
    }

    fn execute(&self, _request: &CommandRequest) -> Result<CommandOutput> {
        Err(Self::error())
    }

    fn try_execute(&self, _request: &CommandRequest) -> Result<Option<CommandOutput>> {
        Ok(None)
    }
}
