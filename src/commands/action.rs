// src/commands/action.rs
//! Batch actions and rollback

use super::Session;
use anyhow::{Context, Result};
use appwarden::db::models::SnapshotRecord;
use appwarden::prompt::ModeLossPrompt;
use appwarden::{
    ActionKind, BatchExecutionResult, ExecutionMode, ModeLossChoice, ModeLossHandler,
    RecoveringRunner,
};

/// Apply `action` to `packages`
pub fn cmd_action(session: &Session, action: ActionKind, packages: &[String]) -> Result<()> {
    let result = run_with_recovery(session, action, packages.to_vec())?;
    finish(&result)
}

/// Replay the retained snapshot
pub fn cmd_rollback(session: &Session, dry_run: bool) -> Result<()> {
    if dry_run {
        return show_rollback_plan(session);
    }

    if !SnapshotRecord::exists(&session.conn)? {
        println!("No snapshot retained; nothing to roll back.");
        println!("\nSnapshots are captured before freeze, unfreeze and background changes.");
        return Err(appwarden::Error::SnapshotMissing.into());
    }

    let result = run_with_recovery(session, ActionKind::Rollback, Vec::new())?;
    if result.failure_count > 0 || result.skipped_count > 0 {
        println!("Snapshot kept; run `appwarden rollback` again to retry.");
    }
    finish(&result)
}

/// Prompts on mode loss and prints every attempt
struct CliRecovery {
    prompt: ModeLossPrompt,
}

impl ModeLossHandler for CliRecovery {
    fn report(&mut self, result: &BatchExecutionResult) {
        print_result(result);
    }

    fn choose(&mut self, lost: ExecutionMode, reason: &str) -> appwarden::Result<ModeLossChoice> {
        self.prompt.choose(lost, reason)
    }

    fn switch_to(&mut self, current: ExecutionMode) -> appwarden::Result<Option<ExecutionMode>> {
        self.prompt.switch_to(current)
    }
}

/// Run a batch, offering retry / switch / view-only when the mode is lost
fn run_with_recovery(
    session: &Session,
    action: ActionKind,
    targets: Vec<String>,
) -> Result<BatchExecutionResult> {
    let mode = session.resolve_mode()?;
    if !mode.is_privileged() {
        anyhow::bail!(
            "No privileged transport available (view-only). \
             Run `appwarden mode set root|remote` or start the helper."
        );
    }

    let runner = RecoveringRunner::new(
        &session.conn,
        &session.transports,
        &session.validator,
        session.config.user_id,
    );
    let mut handler = CliRecovery {
        prompt: ModeLossPrompt::detect(),
    };
    runner
        .run(mode, action, &targets, &mut handler)
        .with_context(|| format!("Failed to run {}", action))
}

fn print_result(result: &BatchExecutionResult) {
    println!();
    println!("{:<45} {:<8} DETAIL", "PACKAGE", "STATUS");
    println!("{}", "-".repeat(70));
    for outcome in &result.outcomes {
        println!(
            "{:<45} {:<8} {}",
            outcome.package,
            outcome.status,
            outcome.detail.as_deref().unwrap_or("")
        );
    }
    println!();
    println!(
        "{}: {} {}, {} failed, {} skipped",
        result.action,
        result.success_count,
        result.action.past_tense(),
        result.failure_count,
        result.skipped_count
    );
}

fn finish(result: &BatchExecutionResult) -> Result<()> {
    if result.is_full_success() {
        return Ok(());
    }
    if result.failure_count == 0 && result.success_count == 0 {
        anyhow::bail!("Nothing was applied; every target was rejected by policy");
    }
    if result.failure_count > 0 {
        anyhow::bail!(
            "{} of {} target(s) failed",
            result.failure_count,
            result.outcomes.len()
        );
    }
    Ok(())
}

fn show_rollback_plan(session: &Session) -> Result<()> {
    let Some(snapshot) = SnapshotRecord::load(&session.conn)? else {
        println!("No snapshot retained; nothing to roll back.");
        return Ok(());
    };

    println!("Snapshot {}", snapshot.id);
    println!("{}", "=".repeat(40));
    println!("Captured: {}", snapshot.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Packages: {}", snapshot.states.len());

    for state in &snapshot.states {
        println!();
        println!(
            "  {} ({}, background {}, wake lock {})",
            state.package_name,
            if state.enabled { "enabled" } else { "disabled" },
            state.background_policy.as_arg(),
            state.wake_lock_policy.as_arg()
        );
        for request in state.restore_commands() {
            println!("    {}", request);
        }
    }

    println!();
    println!("[DRY RUN] Nothing was sent.");
    Ok(())
}
