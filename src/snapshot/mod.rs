// src/snapshot/mod.rs

//! Pre-mutation state capture and inverse command generation
//!
//! A snapshot records, per package, the enabled flag and the background and
//! wake-lock app-operation modes as queried live through the transport.
//! Only one snapshot is retained; see `db::models::SnapshotRecord`.

mod query;

pub use query::parse_appops_mode;

use crate::command::{self, CommandRequest, OP_RUN_ANY_IN_BACKGROUND, OP_RUN_IN_BACKGROUND, OP_WAKE_LOCK};
use crate::db::models::SnapshotRecord;
use crate::error::Result;
use crate::gate::CommandGate;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::debug;
use uuid::Uuid;

/// Mode of an app-operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppOpMode {
    Allow,
    Ignore,
    Deny,
}

impl AppOpMode {
    /// Map a mode word as printed by `appops`
    ///
    /// `default` and `foreground` behave as allowed for background execution.
    pub fn from_appops(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "allow" | "allowed" | "default" | "foreground" => Some(AppOpMode::Allow),
            "ignore" | "ignored" => Some(AppOpMode::Ignore),
            "deny" | "errored" => Some(AppOpMode::Deny),
            _ => None,
        }
    }

    /// The word `appops set` accepts
    pub fn as_arg(&self) -> &'static str {
        match self {
            AppOpMode::Allow => "allow",
            AppOpMode::Ignore => "ignore",
            AppOpMode::Deny => "deny",
        }
    }
}

/// Recorded state of one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    pub package_name: String,
    pub enabled: bool,
    pub background_policy: AppOpMode,
    pub wake_lock_policy: AppOpMode,
}

impl AppState {
    /// Query the live state of `package`
    pub fn capture(gate: &CommandGate<'_>, package: &str) -> Result<Self> {
        let enabled = query::query_enabled(gate, package)?;
        let background_policy = query::query_op(gate, package, OP_RUN_IN_BACKGROUND)?;
        let wake_lock_policy = query::query_op(gate, package, OP_WAKE_LOCK)?;

        debug!(
            "Captured {}: enabled={} background={} wake_lock={}",
            package, enabled, background_policy, wake_lock_policy
        );

        Ok(Self {
            package_name: package.to_string(),
            enabled,
            background_policy,
            wake_lock_policy,
        })
    }

    /// Commands restoring this state
    ///
    /// Policies are restored exactly. The package is re-enabled if it was
    /// enabled; a recorded disabled state is never re-applied.
    pub fn restore_commands(&self) -> Vec<CommandRequest> {
        let pkg = &self.package_name;
        let background = self.background_policy.as_arg();

        let mut commands = vec![
            command::appops_set(pkg, OP_RUN_IN_BACKGROUND, background),
            command::appops_set(pkg, OP_RUN_ANY_IN_BACKGROUND, background),
            command::appops_set(pkg, OP_WAKE_LOCK, self.wake_lock_policy.as_arg()),
        ];
        if self.enabled {
            commands.push(command::enable(pkg));
        }
        commands
    }
}

/// Captured pre-mutation state for a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: String,
    pub states: Vec<AppState>,
    pub created_at: DateTime<Utc>,
}

impl StateSnapshot {
    pub fn new(states: Vec<AppState>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            states,
            created_at: Utc::now(),
        }
    }

    pub fn packages(&self) -> Vec<String> {
        self.states.iter().map(|s| s.package_name.clone()).collect()
    }
}

/// Whether a rollback can be offered right now
///
/// Reads the store on every call.
pub fn rollback_available(conn: &Connection) -> Result<bool> {
    SnapshotRecord::exists(conn)
}
