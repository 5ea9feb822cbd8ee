// src/snapshot/query.rs

//! Live state queries and output parsing

use crate::command::{self, CommandOutput};
use crate::error::{Error, Result};
use crate::gate::CommandGate;
use crate::snapshot::AppOpMode;

/// Whether `package` is enabled, failing if it is not installed
pub(crate) fn query_enabled(gate: &CommandGate<'_>, package: &str) -> Result<bool> {
    let enabled = gate.execute(&command::list_enabled(package))?;
    if command::listing_contains(&enabled, package) {
        return Ok(true);
    }

    let disabled = gate.execute(&command::list_disabled(package))?;
    if command::listing_contains(&disabled, package) {
        return Ok(false);
    }

    Err(Error::ExecutionFailed {
        code: 1,
        message: format!("package {} is not installed", package),
    })
}

/// Current mode of one app-operation for `package`
pub(crate) fn query_op(gate: &CommandGate<'_>, package: &str, op: &str) -> Result<AppOpMode> {
    let output = gate.execute(&command::appops_get(package, op))?;
    parse_appops_mode(&output, op).ok_or_else(|| {
        Error::Protocol(format!(
            "unrecognized appops output for {} {}: {}",
            package,
            op,
            output.output.trim()
        ))
    })
}

/// Extract the mode of `op` from `appops get` output
///
/// Accepts a per-package line (`OP: mode; time=...`), falls back to a
/// per-uid line (`Uid mode: OP: mode`), and reads "No operations." as the
/// default mode.
pub fn parse_appops_mode(output: &CommandOutput, op: &str) -> Option<AppOpMode> {
    let op_prefix = format!("{}:", op);
    let mut uid_mode = None;

    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(&op_prefix) {
            return mode_word(rest);
        }
        if let Some(rest) = line.strip_prefix("Uid mode:") {
            let rest = rest.trim();
            if let Some(mode) = mode_word(rest.strip_prefix(&op_prefix).unwrap_or(rest)) {
                uid_mode = Some(mode);
            }
        }
        if line.starts_with("No operations") {
            uid_mode = uid_mode.or(Some(AppOpMode::Allow));
        }
    }

    uid_mode
}

fn mode_word(rest: &str) -> Option<AppOpMode> {
    let word = rest.split(';').next()?.trim();
    AppOpMode::from_appops(word)
}
