// src/db/models/action_log.rs

//! Bounded action history
//!
//! Every batch or rollback appends exactly one entry. Once the log holds
//! more than `MAX_LOG_ENTRIES` rows the oldest are evicted in the same
//! transaction as the insert.

use crate::batch::ActionKind;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use std::str::FromStr;
use tracing::warn;

/// Maximum number of retained log entries
pub const MAX_LOG_ENTRIES: usize = 100;

/// A record of one completed batch or rollback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLogEntry {
    pub id: Option<i64>,
    pub action: ActionKind,
    pub targets: Vec<String>,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActionLogEntry {
    pub fn new(action: ActionKind, targets: Vec<String>, success: bool) -> Self {
        Self {
            id: None,
            action,
            targets,
            success,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Append this entry, evicting the oldest beyond the bound
    pub fn append(&mut self, conn: &Connection) -> Result<i64> {
        let targets_json = serde_json::to_string(&self.targets)?;

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO action_log (action_kind, targets_json, success, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.action.to_string(),
                targets_json,
                self.success,
                &self.error,
                self.created_at.to_rfc3339()
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "DELETE FROM action_log WHERE id NOT IN (
                SELECT id FROM action_log ORDER BY id DESC LIMIT ?1
             )",
            [MAX_LOG_ENTRIES as i64],
        )?;
        tx.commit()?;

        self.id = Some(id);
        Ok(id)
    }

    /// Newest-first entries, failing on any undecodable row
    pub fn try_list(conn: &Connection, limit: Option<usize>) -> Result<Vec<Self>> {
        let limit = limit.unwrap_or(MAX_LOG_ENTRIES) as i64;
        let mut stmt = conn.prepare(
            "SELECT id, action_kind, targets_json, success, error_message, created_at
             FROM action_log ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map([limit], |row| RawEntry::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(RawEntry::decode).collect()
    }

    /// Newest-first entries; a corrupted log reads as empty
    pub fn list(conn: &Connection, limit: Option<usize>) -> Result<Vec<Self>> {
        match Self::try_list(conn, limit) {
            Ok(entries) => Ok(entries),
            Err(Error::DeserializationFailed(msg)) => {
                warn!("Action log is unreadable, treating it as empty: {}", msg);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub fn count(conn: &Connection) -> Result<usize> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM action_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete the whole history together with the retained snapshot
    pub fn clear_history(conn: &Connection) -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM action_log", [])?;
        tx.execute("DELETE FROM snapshot", [])?;
        tx.commit()?;
        Ok(())
    }
}

struct RawEntry {
    id: i64,
    action_kind: String,
    targets_json: String,
    success: bool,
    error: Option<String>,
    created_at: String,
}

impl RawEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            action_kind: row.get(1)?,
            targets_json: row.get(2)?,
            success: row.get(3)?,
            error: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<ActionLogEntry> {
        let action = ActionKind::from_str(&self.action_kind).map_err(|_| {
            Error::DeserializationFailed(format!("unknown action kind '{}'", self.action_kind))
        })?;
        let targets: Vec<String> = serde_json::from_str(&self.targets_json)?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| Error::DeserializationFailed(format!("log timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(ActionLogEntry {
            id: Some(self.id),
            action,
            targets,
            success: self.success,
            error: self.error,
            created_at,
        })
    }
}
