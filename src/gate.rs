// src/gate.rs

//! The single path from a command to a transport
//!
//! `CommandGate` pairs the active transport with the policy validator.
//! Each call first confirms the transport is usable, then validates, then
//! submits. Checking the transport first means a session with no privilege
//! backend fails with `TransportUnavailable` before any protected-target
//! lookup happens.

use crate::command::{CommandOutput, CommandRequest};
use crate::error::Result;
use crate::mode::ExecutionMode;
use crate::policy::PolicyValidator;
use crate::transport::Transport;
use tracing::debug;

pub struct CommandGate<'a> {
    transport: &'a dyn Transport,
    validator: &'a PolicyValidator,
}

impl<'a> CommandGate<'a> {
    pub fn new(transport: &'a dyn Transport, validator: &'a PolicyValidator) -> Self {
        Self {
            transport,
            validator,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.transport.mode()
    }

    pub fn validator(&self) -> &'a PolicyValidator {
        self.validator
    }

    pub fn ensure_ready(&self) -> Result<()> {
        self.transport.ensure_ready()
    }

    /// Validate and run one command
    pub fn execute(&self, request: &CommandRequest) -> Result<CommandOutput> {
        self.transport.ensure_ready()?;
        self.validator.check(request)?;
        debug!("Submitting via {}: {}", self.transport.mode(), request);
        self.transport.execute(request)
    }

    /// Validate every command, then attempt each one
    ///
    /// If any command fails validation nothing is submitted and the whole
    /// batch is rejected. Otherwise every command is attempted and its own
    /// result reported.
    pub fn execute_batch(&self, requests: &[CommandRequest]) -> Result<Vec<Result<CommandOutput>>> {
        self.transport.ensure_ready()?;
        for request in requests {
            self.validator.check(request)?;
        }
        Ok(self.transport.execute_batch(requests))
    }

    /// Low-priority read that gives way to anything in flight
    ///
    /// Returns `None` when the transport is busy, not yet established, or
    /// the command fails. Never waits for the session.
    pub fn try_query(&self, request: &CommandRequest) -> Option<CommandOutput> {
        if !self.validator.accepts(request) {
            return None;
        }
        match self.transport.try_execute(request) {
            Ok(output) => output,
            Err(e) => {
                debug!("Skipped low-priority query '{}': {}", request, e);
                None
            }
        }
    }
}
