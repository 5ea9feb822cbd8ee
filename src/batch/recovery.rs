// src/batch/recovery.rs

//! Mode-loss recovery around a batch
//!
//! When a batch reports mode loss the handler decides what happens next.
//! Retry and switch re-run only the FAILED targets as a continuation of the
//! same logical batch, so the first attempt's snapshot is extended rather
//! than replaced. View-only stops and returns the last result.

use super::{ActionKind, BatchExecutionResult, BatchOrchestrator};
use crate::error::{Error, Result};
use crate::gate::CommandGate;
use crate::mode::{ExecutionMode, ModeLossChoice, ModeResolver};
use crate::policy::PolicyValidator;
use crate::transport::TransportProvider;
use rusqlite::Connection;
use tracing::info;

/// Answers the questions raised when the active mode is lost
pub trait ModeLossHandler {
    /// Called with the result of every attempt
    fn report(&mut self, _result: &BatchExecutionResult) {}

    fn choose(&mut self, lost: ExecutionMode, reason: &str) -> Result<ModeLossChoice>;

    /// Mode to switch to; `None` backs out
    fn switch_to(&mut self, current: ExecutionMode) -> Result<Option<ExecutionMode>>;
}

/// Runs a batch and keeps going through mode loss as the handler directs
pub struct RecoveringRunner<'a> {
    conn: &'a Connection,
    provider: &'a dyn TransportProvider,
    validator: &'a PolicyValidator,
    user_id: u32,
}

impl<'a> RecoveringRunner<'a> {
    pub fn new(
        conn: &'a Connection,
        provider: &'a dyn TransportProvider,
        validator: &'a PolicyValidator,
        user_id: u32,
    ) -> Self {
        Self {
            conn,
            provider,
            validator,
            user_id,
        }
    }

    /// Apply `action` starting in `mode`; returns the last attempt's result
    ///
    /// A switch is persisted as the user's mode choice.
    pub fn run(
        &self,
        mode: ExecutionMode,
        action: ActionKind,
        targets: &[String],
        handler: &mut dyn ModeLossHandler,
    ) -> Result<BatchExecutionResult> {
        let mut mode = mode;
        let mut targets = targets.to_vec();
        let mut previous: Option<BatchExecutionResult> = None;

        loop {
            if !mode.is_privileged() {
                return Err(Error::TransportUnavailable(
                    "no privileged transport is selected (view-only)".to_string(),
                ));
            }

            info!("Using {}", mode.display_name());
            let transport = self.provider.open(mode);
            let gate = CommandGate::new(transport.as_ref(), self.validator);
            let orchestrator = BatchOrchestrator::new(self.conn, gate, self.user_id);

            let result = match &previous {
                Some(previous) => orchestrator.resume(action, &targets, previous)?,
                None => orchestrator.run(action, &targets)?,
            };
            handler.report(&result);

            let Some(reason) = result.mode_loss.clone() else {
                return Ok(result);
            };

            match handler.choose(mode, &reason)? {
                ModeLossChoice::Retry => {}
                ModeLossChoice::SwitchMode => match handler.switch_to(mode)? {
                    Some(next) => {
                        ModeResolver::new(self.conn, self.provider).select(next)?;
                        mode = next;
                    }
                    None => return Ok(result),
                },
                ModeLossChoice::ViewOnly => return Ok(result),
            }

            // Rollback always replays the whole retained snapshot
            if action != ActionKind::Rollback {
                targets = result.failed_targets();
                if targets.is_empty() {
                    return Ok(result);
                }
            }
            previous = Some(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedProvider;
    use std::sync::Arc;

    /// Always answers view-only
    struct GiveUp {
        asked: usize,
    }

    impl ModeLossHandler for GiveUp {
        fn choose(&mut self, _lost: ExecutionMode, _reason: &str) -> Result<ModeLossChoice> {
            self.asked += 1;
            Ok(ModeLossChoice::ViewOnly)
        }

        fn switch_to(&mut self, _current: ExecutionMode) -> Result<Option<ExecutionMode>> {
            Ok(None)
        }
    }

    #[test]
    fn test_view_only_returns_first_result() {
        let conn = crate::db::open_in_memory().unwrap();
        // Every mode is offline
        let provider = ScriptedProvider::new();
        let validator = PolicyValidator::new(Arc::new(|_: &str| false)).unwrap();
        let runner = RecoveringRunner::new(&conn, &provider, &validator, 0);

        let mut handler = GiveUp { asked: 0 };
        let result = runner
            .run(
                ExecutionMode::Root,
                ActionKind::ForceStop,
                &["com.a".to_string()],
                &mut handler,
            )
            .unwrap();
        assert_eq!(handler.asked, 1);
        assert_eq!(result.failure_count, 1);
        assert!(result.mode_loss.is_some());
    }

    #[test]
    fn test_view_only_mode_is_refused() {
        let conn = crate::db::open_in_memory().unwrap();
        let provider = ScriptedProvider::new();
        let validator = PolicyValidator::new(Arc::new(|_: &str| false)).unwrap();
        let runner = RecoveringRunner::new(&conn, &provider, &validator, 0);

        let err = runner
            .run(
                ExecutionMode::None,
                ActionKind::ForceStop,
                &["com.a".to_string()],
                &mut GiveUp { asked: 0 },
            )
            .unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable(_)));
    }
}
