// src/transport/testing.rs

//! Scripted transports for unit tests

use crate::command::{CommandOutput, CommandRequest};
use crate::error::{Error, Result};
use crate::mode::ExecutionMode;
use crate::transport::{Transport, TransportProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Reply {
    Output(String),
    Fail(i32, String),
    Timeout,
    Lost,
}

#[derive(Default)]
struct Script {
    replies: HashMap<String, Reply>,
    sent: Vec<String>,
}

/// A transport answering from a table of canned replies
///
/// Unscripted commands succeed with empty output. Clones share state.
#[derive(Clone)]
pub struct ScriptedTransport {
    mode: ExecutionMode,
    available: bool,
    script: Arc<Mutex<Script>>,
    checks: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn available(mode: ExecutionMode) -> Self {
        Self {
            mode,
            available: true,
            script: Arc::default(),
            checks: Arc::default(),
        }
    }

    pub fn unavailable(mode: ExecutionMode) -> Self {
        Self {
            available: false,
            ..Self::available(mode)
        }
    }

    pub fn respond(self, command: &str, output: &str) -> Self {
        self.set(command, Reply::Output(output.to_string()))
    }

    pub fn fail(self, command: &str, code: i32, message: &str) -> Self {
        self.set(command, Reply::Fail(code, message.to_string()))
    }

    pub fn time_out(self, command: &str) -> Self {
        self.set(command, Reply::Timeout)
    }

    /// The transport disappears when `command` is sent
    pub fn lose_on(self, command: &str) -> Self {
        self.set(command, Reply::Lost)
    }

    fn set(self, command: &str, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .insert(command.to_string(), reply);
        self
    }

    /// Every command that reached the transport, in order
    pub fn sent(&self) -> Vec<String> {
        self.script.lock().unwrap().sent.clone()
    }
}

impl Transport for ScriptedTransport {
    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn is_granted(&self) -> bool {
        self.available
    }

    fn request_access(&self) -> Result<()> {
        self.ensure_ready()
    }

    fn is_available(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.available
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(Error::TransportUnavailable("scripted transport is offline".into()))
        }
    }

    fn execute(&self, request: &CommandRequest) -> Result<CommandOutput> {
        self.ensure_ready()?;

        let mut script = self.script.lock().unwrap();
        script.sent.push(request.command().to_string());
        match script.replies.get(request.command()).cloned() {
            None => Ok(CommandOutput::default()),
            Some(Reply::Output(output)) => Ok(CommandOutput::new(0, output)),
            Some(Reply::Fail(code, message)) => Err(Error::ExecutionFailed { code, message }),
            Some(Reply::Timeout) => Err(Error::Timeout(30)),
            Some(Reply::Lost) => Err(Error::TransportDenied("scripted revocation".into())),
        }
    }

    fn try_execute(&self, request: &CommandRequest) -> Result<Option<CommandOutput>> {
        if !self.available {
            return Ok(None);
        }
        self.execute(request).map(Some)
    }
}

/// Provider handing out scripted transports; missing modes are offline
pub struct ScriptedProvider {
    transports: HashMap<ExecutionMode, ScriptedTransport>,
    checks: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            transports: HashMap::new(),
            checks: Arc::default(),
        }
    }

    pub fn with(mut self, mode: ExecutionMode, mut transport: ScriptedTransport) -> Self {
        transport.checks = Arc::clone(&self.checks);
        self.transports.insert(mode, transport);
        self
    }

    /// Number of availability checks across every transport handed out
    pub fn availability_checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl TransportProvider for ScriptedProvider {
    fn open(&self, mode: ExecutionMode) -> Box<dyn Transport> {
        let mut transport = self
            .transports
            .get(&mode)
            .cloned()
            .unwrap_or_else(|| ScriptedTransport::unavailable(mode));
        transport.checks = Arc::clone(&self.checks);
        Box::new(transport)
    }
}
