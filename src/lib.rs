// src/lib.rs

//! Appwarden
//!
//! Privileged control of other installed apps: disable, stop, clear storage
//! and restrict background execution, through one of two elevation
//! transports, with every command policy-checked and reversible batches
//! snapshotted for rollback.
//!
//! # Architecture
//!
//! - Mode resolver: picks the active transport once per session and persists it
//! - Transports: a long-lived root shell or a socket-connected helper service
//! - Policy validator: deny list, allow list and protected-target check
//! - Command gate: readiness, then policy, then transport, for every command
//! - Batch orchestrator: best-effort per target, one log entry per batch
//! - Snapshots: live state captured before reversible batches, replayed on rollback
//! - Database: SQLite holds the mode, the retained snapshot and the action log

pub mod batch;
pub mod command;
pub mod config;
pub mod db;
mod error;
pub mod gate;
pub mod helper;
pub mod mode;
pub mod policy;
pub mod prompt;
pub mod snapshot;
pub mod transport;

pub use batch::{
    ActionKind, BatchExecutionResult, BatchOrchestrator, ModeLossHandler, RecoveringRunner,
    TargetOutcome, TargetStatus,
};
pub use command::{CommandOutput, CommandRequest};
pub use config::Config;
pub use db::models::{ActionLogEntry, MAX_LOG_ENTRIES};
pub use error::{Error, Result};
pub use gate::CommandGate;
pub use mode::{ExecutionMode, ModeLossChoice, ModeResolver};
pub use policy::{CommandClass, PolicyValidator, ProtectedClassifier, ProtectedList, Verdict};
pub use snapshot::{AppOpMode, AppState, StateSnapshot};
pub use transport::{SystemTransports, Transport, TransportProvider};
