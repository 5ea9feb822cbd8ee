// src/batch/mod.rs

//! Batch orchestration
//!
//! One logical action is applied to a list of packages, best-effort:
//!
//! 1. Confirm the transport is usable; if not, every target fails and the
//!    mode loss is reported.
//! 2. Generate each target's commands and validate all of them. A target
//!    with any rejected command is SKIPPED; the others proceed.
//! 3. For reversible actions, capture the live state of every remaining
//!    target and save it as the retained snapshot before anything is sent.
//! 4. Send each target's commands. A target is FAILED if any of its
//!    commands failed, SUCCESS otherwise. Nothing stops early.
//! 5. Append exactly one action log entry.
//!
//! Rollback replays the retained snapshot with the same per-target,
//! best-effort semantics.

mod action;
pub mod recovery;

pub use action::ActionKind;
pub use recovery::{ModeLossHandler, RecoveringRunner};

use crate::command::CommandRequest;
use crate::db::models::{ActionLogEntry, SnapshotRecord};
use crate::error::{Error, Result};
use crate::gate::CommandGate;
use crate::snapshot::{AppState, StateSnapshot};
use rusqlite::Connection;
use serde::Serialize;
use strum_macros::Display;
use tracing::{debug, info, warn};

/// Outcome class of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TargetStatus {
    /// Every command succeeded
    Success,
    /// Approved by policy but execution failed
    Failed,
    /// Rejected by policy; nothing was sent
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetOutcome {
    pub package: String,
    pub status: TargetStatus,
    pub detail: Option<String>,
}

impl TargetOutcome {
    fn success(package: &str) -> Self {
        Self {
            package: package.to_string(),
            status: TargetStatus::Success,
            detail: None,
        }
    }

    fn failed(package: &str, detail: impl Into<String>) -> Self {
        Self {
            package: package.to_string(),
            status: TargetStatus::Failed,
            detail: Some(detail.into()),
        }
    }

    fn skipped(package: &str, detail: impl Into<String>) -> Self {
        Self {
            package: package.to_string(),
            status: TargetStatus::Skipped,
            detail: Some(detail.into()),
        }
    }
}

/// Aggregate result of one batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchExecutionResult {
    pub action: ActionKind,
    pub outcomes: Vec<TargetOutcome>,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    /// Set when the active mode stopped working during the batch
    pub mode_loss: Option<String>,
    /// Snapshot this batch saved or extended
    pub snapshot_id: Option<String>,
}

impl BatchExecutionResult {
    pub fn new(action: ActionKind, outcomes: Vec<TargetOutcome>, mode_loss: Option<String>) -> Self {
        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        let success_count = count(TargetStatus::Success);
        let failure_count = count(TargetStatus::Failed);
        let skipped_count = count(TargetStatus::Skipped);

        Self {
            action,
            outcomes,
            success_count,
            failure_count,
            skipped_count,
            mode_loss,
            snapshot_id: None,
        }
    }

    /// No failures and at least one success
    ///
    /// A batch made only of skips is not a full success.
    pub fn is_full_success(&self) -> bool {
        self.failure_count == 0 && self.success_count > 0
    }

    pub fn outcome(&self, package: &str) -> Option<&TargetOutcome> {
        self.outcomes.iter().find(|o| o.package == package)
    }

    pub fn targets(&self) -> Vec<String> {
        self.outcomes.iter().map(|o| o.package.clone()).collect()
    }

    pub fn failed_targets(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.status == TargetStatus::Failed)
            .map(|o| o.package.clone())
            .collect()
    }

    /// Error text for the log entry, present only when something failed
    fn error_summary(&self) -> Option<String> {
        if self.failure_count == 0 {
            return None;
        }

        let failed: Vec<&str> = self
            .outcomes
            .iter()
            .filter(|o| o.status == TargetStatus::Failed)
            .map(|o| o.package.as_str())
            .collect();
        let mut summary = format!(
            "{} of {} targets failed: {}",
            self.failure_count,
            self.outcomes.len(),
            failed.join(", ")
        );
        if let Some(loss) = &self.mode_loss {
            summary.push_str(&format!(" (mode lost: {})", loss));
        }
        Some(summary)
    }
}

/// A target after planning
enum Slot {
    Done(TargetOutcome),
    Pending {
        package: String,
        commands: Vec<CommandRequest>,
    },
}

/// Runs batches and rollbacks against one gate, sequentially
pub struct BatchOrchestrator<'a> {
    conn: &'a Connection,
    gate: CommandGate<'a>,
    user_id: u32,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(conn: &'a Connection, gate: CommandGate<'a>, user_id: u32) -> Self {
        Self {
            conn,
            gate,
            user_id,
        }
    }

    /// Apply `action` to every target
    ///
    /// Per-target problems land in the result. An `Err` means the durable
    /// records could not be written.
    pub fn run(&self, action: ActionKind, targets: &[String]) -> Result<BatchExecutionResult> {
        self.execute(action, targets, None)
    }

    /// Re-run some targets of an earlier batch of the same action
    ///
    /// States captured now join the snapshot `previous` saved instead of
    /// replacing it, so targets that already succeeded keep their rollback
    /// point. A state the earlier attempt recorded is kept over a new one.
    pub fn resume(
        &self,
        action: ActionKind,
        targets: &[String],
        previous: &BatchExecutionResult,
    ) -> Result<BatchExecutionResult> {
        self.execute(action, targets, previous.snapshot_id.as_deref())
    }

    fn execute(
        &self,
        action: ActionKind,
        targets: &[String],
        continues: Option<&str>,
    ) -> Result<BatchExecutionResult> {
        if action == ActionKind::Rollback {
            return self.rollback();
        }

        let targets = dedup(targets);
        info!("Running {} on {} target(s)", action, targets.len());

        if let Err(e) = self.gate.ensure_ready() {
            let mut result = self.abort(action, &targets, e)?;
            result.snapshot_id = continues.map(str::to_string);
            return Ok(result);
        }

        let mut slots = self.plan(action, &targets);
        let mut mode_loss = None;
        let mut snapshot_id = None;

        if action.is_reversible() {
            snapshot_id = self.capture(&mut slots, &mut mode_loss, continues)?;
        }

        let outcomes = slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Done(outcome) => outcome,
                Slot::Pending { package, commands } => {
                    self.apply(&package, &commands, &mut mode_loss)
                }
            })
            .collect();

        let mut result = BatchExecutionResult::new(action, outcomes, mode_loss);
        result.snapshot_id = snapshot_id;
        self.record(&result)?;
        Ok(result)
    }

    /// Replay the retained snapshot
    ///
    /// Fails with `SnapshotMissing` when there is nothing to replay. The
    /// snapshot is kept unless every target was restored.
    pub fn rollback(&self) -> Result<BatchExecutionResult> {
        let snapshot = SnapshotRecord::load(self.conn)?.ok_or(Error::SnapshotMissing)?;
        let targets = snapshot.packages();
        info!(
            "Rolling back snapshot {} ({} package(s))",
            snapshot.id,
            targets.len()
        );

        if let Err(e) = self.gate.ensure_ready() {
            return self.abort(ActionKind::Rollback, &targets, e);
        }

        let mut mode_loss = None;
        let outcomes = snapshot
            .states
            .iter()
            .map(|state| {
                self.apply(&state.package_name, &state.restore_commands(), &mut mode_loss)
            })
            .collect();

        let result = BatchExecutionResult::new(ActionKind::Rollback, outcomes, mode_loss);
        if result.failure_count == 0 && result.skipped_count == 0 {
            SnapshotRecord::delete(self.conn)?;
            debug!("Snapshot {} consumed", snapshot.id);
        } else {
            warn!("Rollback incomplete; keeping snapshot {}", snapshot.id);
        }

        self.record(&result)?;
        Ok(result)
    }

    /// Every target fails because the transport is not usable
    fn abort(&self, action: ActionKind, targets: &[String], error: Error) -> Result<BatchExecutionResult> {
        warn!("{} not started: {}", action, error);
        let detail = error.to_string();
        let outcomes = targets
            .iter()
            .map(|t| TargetOutcome::failed(t, detail.clone()))
            .collect();

        let result = BatchExecutionResult::new(
            action,
            outcomes,
            error.is_mode_loss().then(|| detail.clone()),
        );
        self.record(&result)?;
        Ok(result)
    }

    /// Generate and validate every command before anything is sent
    fn plan(&self, action: ActionKind, targets: &[String]) -> Vec<Slot> {
        targets
            .iter()
            .map(|package| {
                let commands = action.commands(package, self.user_id);
                let rejection = commands
                    .iter()
                    .find_map(|c| self.gate.validator().check(c).err());

                match rejection {
                    Some(e) => Slot::Done(TargetOutcome::skipped(package, e.to_string())),
                    None => Slot::Pending {
                        package: package.clone(),
                        commands,
                    },
                }
            })
            .collect()
    }

    /// Snapshot the approved targets; a target that cannot be read is not touched
    ///
    /// With `continues`, states are merged into that snapshot if it is still
    /// the retained one. Returns the id of the snapshot now covering the batch.
    fn capture(
        &self,
        slots: &mut [Slot],
        mode_loss: &mut Option<String>,
        continues: Option<&str>,
    ) -> Result<Option<String>> {
        let mut states: Vec<AppState> = Vec::new();

        for slot in slots.iter_mut() {
            let Slot::Pending { package, .. } = slot else {
                continue;
            };

            match AppState::capture(&self.gate, package) {
                Ok(state) => states.push(state),
                Err(e) => {
                    warn!("Cannot capture state of {}: {}", package, e);
                    note_mode_loss(&e, mode_loss);
                    *slot = Slot::Done(TargetOutcome::failed(
                        package,
                        format!("state capture failed: {}", e),
                    ));
                }
            }
        }

        if states.is_empty() {
            return Ok(continues.map(str::to_string));
        }

        let retained = match continues {
            Some(id) => SnapshotRecord::load(self.conn)?.filter(|s| s.id == id),
            None => None,
        };

        let snapshot = match retained {
            Some(mut snapshot) => {
                for state in states {
                    if !snapshot.states.iter().any(|s| s.package_name == state.package_name) {
                        snapshot.states.push(state);
                    }
                }
                snapshot
            }
            None => StateSnapshot::new(states),
        };

        SnapshotRecord::save(self.conn, &snapshot)?;
        info!(
            "Saved snapshot {} of {} package(s)",
            snapshot.id,
            snapshot.states.len()
        );
        Ok(Some(snapshot.id))
    }

    /// Send every command of one target and classify the target
    fn apply(&self, package: &str, commands: &[CommandRequest], mode_loss: &mut Option<String>) -> TargetOutcome {
        let mut errors: Vec<Error> = Vec::new();
        for request in commands {
            if let Err(e) = self.gate.execute(request) {
                warn!("{} failed for {}: {}", request, package, e);
                note_mode_loss(&e, mode_loss);
                errors.push(e);
            }
        }

        match errors.as_slice() {
            [] => TargetOutcome::success(package),
            [first, ..] if errors.iter().all(Error::is_policy_rejection) => {
                TargetOutcome::skipped(package, first.to_string())
            }
            _ => {
                let detail = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>();
                TargetOutcome::failed(package, detail.join("; "))
            }
        }
    }

    fn record(&self, result: &BatchExecutionResult) -> Result<()> {
        let mut entry = ActionLogEntry::new(result.action, result.targets(), result.is_full_success());
        if let Some(error) = result.error_summary() {
            entry = entry.with_error(error);
        }
        entry.append(self.conn)?;

        info!(
            "{}: {} succeeded, {} failed, {} skipped",
            result.action, result.success_count, result.failure_count, result.skipped_count
        );
        Ok(())
    }
}

fn note_mode_loss(error: &Error, mode_loss: &mut Option<String>) {
    if error.is_mode_loss() && mode_loss.is_none() {
        *mode_loss = Some(error.to_string());
    }
}

/// Drop repeated targets, keeping first occurrence order
fn dedup(targets: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    targets
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}
