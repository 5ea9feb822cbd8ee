// src/commands/history.rs
//! Action log commands

use super::Session;
use anyhow::{Context, Result};
use appwarden::snapshot::rollback_available;
use appwarden::{ActionLogEntry, MAX_LOG_ENTRIES};
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::info;

/// List the action log, newest first
pub fn cmd_history(session: &Session, limit: Option<usize>) -> Result<()> {
    let entries = ActionLogEntry::list(&session.conn, limit)?;

    if entries.is_empty() {
        println!("No actions recorded.");
        return Ok(());
    }

    println!("{:>5}  {:19}  {:20}  {:7}  TARGETS", "ID", "WHEN", "ACTION", "RESULT");
    println!("{}", "-".repeat(78));

    for entry in &entries {
        let targets = if entry.targets.len() > 3 {
            format!(
                "{} (+{} more)",
                entry.targets[..3].join(", "),
                entry.targets.len() - 3
            )
        } else {
            entry.targets.join(", ")
        };

        println!(
            "{:>5}  {:19}  {:20}  {:7}  {}",
            entry.id.map(|id| id.to_string()).unwrap_or_default(),
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            if entry.success { "ok" } else { "FAILED" },
            targets
        );
        if let Some(error) = &entry.error {
            println!("{:>5}  {}", "", error);
        }
    }

    println!();
    println!(
        "Showing {} of at most {} retained entries",
        entries.len(),
        MAX_LOG_ENTRIES
    );
    if rollback_available(&session.conn)? {
        println!("Rollback available: run `appwarden rollback --dry-run` to inspect it.");
    }
    Ok(())
}

/// Delete the action log and the retained snapshot
pub fn cmd_history_clear(session: &Session, yes: bool) -> Result<()> {
    if !yes && !confirm("Clear the action log and discard the rollback snapshot?")? {
        println!("Cancelled.");
        return Ok(());
    }

    ActionLogEntry::clear_history(&session.conn).context("Failed to clear history")?;
    info!("History cleared");
    println!("History cleared. Rollback is no longer available.");
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        anyhow::bail!("Refusing to clear history without a terminal; pass --yes");
    }

    print!("{} [y/N]: ", question);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}
