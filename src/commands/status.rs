// src/commands/status.rs
//! Status overview

use super::Session;
use anyhow::Result;
use appwarden::db::models::SnapshotRecord;
use appwarden::helper::HelperLock;
use appwarden::{ActionLogEntry, CommandGate, CommandRequest, TransportProvider};

pub fn cmd_status(session: &Session) -> Result<()> {
    let mode = session.resolve_mode()?;
    let transport = session.transports.open(mode);

    println!("Appwarden Status");
    println!("{}", "=".repeat(40));
    println!("Database:   {}", session.config.db_path.display());
    println!("Mode:       {}", mode.display_name());
    println!(
        "Permission: {}",
        if transport.is_granted() { "granted" } else { "not confirmed" }
    );


    let lock_path = &session.config.helper.lock_path;
    if HelperLock::is_held(lock_path) {
        match HelperLock::holder_pid(lock_path) {
            Some(pid) => println!("Helper:     running (pid {})", pid),
            None => println!("Helper:     running"),
        }
    } else {
        println!("Helper:     not running");
    }

    // Only answers when the transport is already up; never prompts
    let gate = CommandGate::new(transport.as_ref(), &session.validator);
    if let Some(output) = gate.try_query(&CommandRequest::new("getprop ro.product.model")) {
        println!("Device:     {}", output.output.trim());
    }

    match SnapshotRecord::load(&session.conn)? {
        Some(snapshot) => println!(
            "Rollback:   available ({} package(s), captured {})",
            snapshot.states.len(),
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("Rollback:   not available"),
    }
    println!("History:    {} entries", ActionLogEntry::count(&session.conn)?);

    Ok(())
}
