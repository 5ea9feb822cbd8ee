// src/commands/check.rs
//! Policy dry-run for raw commands

use super::Session;
use anyhow::Result;
use appwarden::{CommandRequest, Verdict};

/// Evaluate `command` exactly as the gate would, without sending it
pub fn cmd_check(session: &Session, command: &str, target: Option<&str>) -> Result<()> {
    let request = match target {
        Some(package) => CommandRequest::targeting(command, package),
        None => CommandRequest::new(command),
    };

    match session.validator.evaluate(&request) {
        Verdict::Allowed(class) => {
            let kind = if class.is_mutating() { "mutating" } else { "read-only" };
            println!("ALLOWED ({}, {})", class, kind);
            Ok(())
        }
        verdict => {
            println!("REJECTED: {}", verdict);
            anyhow::bail!("Command rejected by policy")
        }
    }
}
