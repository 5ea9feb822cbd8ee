// src/commands/mode.rs
//! Execution mode commands

use super::Session;
use anyhow::{Context, Result};
use appwarden::ExecutionMode;

pub fn cmd_mode_show(session: &Session) -> Result<()> {
    let resolver = session.resolver();

    match resolver.persisted()? {
        Some(mode) => println!("Mode: {} ({})", mode, mode.display_name()),
        None => println!("Mode: not selected (detected on next action)"),
    }

    println!();
    println!("{:10}  {:24}  PERMISSION", "MODE", "TRANSPORT");
    println!("{}", "-".repeat(50));
    for mode in ExecutionMode::PRIORITY_ORDER {
        println!(
            "{:10}  {:24}  {}",
            mode.to_string(),
            mode.display_name(),
            if resolver.is_granted(mode) { "granted" } else { "not confirmed" }
        );
    }
    Ok(())
}

pub fn cmd_mode_set(session: &Session, mode: ExecutionMode) -> Result<()> {
    session
        .resolver()
        .select(mode)
        .context("Failed to persist mode")?;

    if mode.is_privileged() {
        println!("Mode set to {}.", mode.display_name());
        println!("Run `appwarden mode verify` to confirm permission now.");
    } else {
        println!("Mode cleared; running view-only until a transport is selected.");
    }
    Ok(())
}

pub fn cmd_mode_clear(session: &Session) -> Result<()> {
    session.resolver().clear().context("Failed to clear mode")?;
    println!("Mode cleared; the next action looks for a transport.");
    Ok(())
}

/// Actively verify the active mode; may show an OS consent prompt
pub fn cmd_mode_verify(session: &Session) -> Result<()> {
    let mode = session.resolve_mode()?;
    if !mode.is_privileged() {
        anyhow::bail!("No privileged transport available");
    }

    println!("Verifying {}...", mode.display_name());
    session
        .resolver()
        .verify(mode)
        .with_context(|| format!("{} is not usable", mode.display_name()))?;
    println!("{} is ready.", mode.display_name());
    Ok(())
}
