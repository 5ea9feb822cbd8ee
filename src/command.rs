// src/command.rs

//! OS command surface
//!
//! `CommandRequest` is what every gate and transport call carries. The
//! builders below produce the exact command strings the device understands;
//! nothing else in the crate formats `pm`/`am`/`appops` invocations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A command string plus the package it targets, if any
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    command: String,
    target: Option<String>,
}

impl CommandRequest {
    /// A command that addresses no particular package
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            target: None,
        }
    }

    /// A command mutating or querying `package`
    pub fn targeting(command: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            target: Some(package.into()),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// Combined stdout/stderr
    pub output: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }
}

/// Named app-operations toggled for background execution
pub const OP_RUN_IN_BACKGROUND: &str = "RUN_IN_BACKGROUND";
pub const OP_RUN_ANY_IN_BACKGROUND: &str = "RUN_ANY_IN_BACKGROUND";
pub const OP_WAKE_LOCK: &str = "WAKE_LOCK";

pub fn disable_user(package: &str, user: u32) -> CommandRequest {
    CommandRequest::targeting(format!("pm disable-user --user {} {}", user, package), package)
}

pub fn enable(package: &str) -> CommandRequest {
    CommandRequest::targeting(format!("pm enable {}", package), package)
}

/// Uninstall for one user, keeping data
pub fn uninstall_keep_data(package: &str, user: u32) -> CommandRequest {
    CommandRequest::targeting(format!("pm uninstall -k --user {} {}", user, package), package)
}

pub fn force_stop(package: &str) -> CommandRequest {
    CommandRequest::targeting(format!("am force-stop {}", package), package)
}

pub fn clear_cache(package: &str) -> CommandRequest {
    CommandRequest::targeting(format!("pm clear --cache-only {}", package), package)
}

pub fn clear_data(package: &str) -> CommandRequest {
    CommandRequest::targeting(format!("pm clear {}", package), package)
}

pub fn appops_set(package: &str, op: &str, mode: &str) -> CommandRequest {
    CommandRequest::targeting(format!("appops set {} {} {}", package, op, mode), package)
}

pub fn appops_get(package: &str, op: &str) -> CommandRequest {
    CommandRequest::targeting(format!("appops get {} {}", package, op), package)
}

/// Enabled packages whose name contains `package`
pub fn list_enabled(package: &str) -> CommandRequest {
    CommandRequest::targeting(format!("pm list packages -e {}", package), package)
}

/// Disabled packages whose name contains `package`
pub fn list_disabled(package: &str) -> CommandRequest {
    CommandRequest::targeting(format!("pm list packages -d {}", package), package)
}

/// Whether `pm list packages` output names exactly `package`
pub fn listing_contains(output: &CommandOutput, package: &str) -> bool {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .any(|name| name == package)
}
