// src/db/models/snapshot.rs

//! Retained state snapshot model
//!
//! The table holds at most one row. Saving replaces it inside a transaction,
//! so readers see either the previous snapshot or the new one in full.

use crate::error::{Error, Result};
use crate::snapshot::{AppState, StateSnapshot};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

/// Persistence for the single retained snapshot
pub struct SnapshotRecord;

impl SnapshotRecord {
    /// Replace the retained snapshot
    pub fn save(conn: &Connection, snapshot: &StateSnapshot) -> Result<()> {
        let states_json = serde_json::to_string(&snapshot.states)?;

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO snapshot (slot, snapshot_id, states_json, created_at)
             VALUES (1, ?1, ?2, ?3)",
            params![
                &snapshot.id,
                states_json,
                snapshot.created_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;

        debug!(
            "Saved snapshot {} ({} packages)",
            snapshot.id,
            snapshot.states.len()
        );
        Ok(())
    }

    /// Load the retained snapshot, reporting undecodable content as an error
    pub fn try_load(conn: &Connection) -> Result<Option<StateSnapshot>> {
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT snapshot_id, states_json, created_at FROM snapshot WHERE slot = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((id, states_json, created_at)) = row else {
            return Ok(None);
        };

        let states: Vec<AppState> = serde_json::from_str(&states_json)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::DeserializationFailed(format!("snapshot timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(Some(StateSnapshot {
            id,
            states,
            created_at,
        }))
    }

    /// Load the retained snapshot; a corrupted record reads as no snapshot
    pub fn load(conn: &Connection) -> Result<Option<StateSnapshot>> {
        match Self::try_load(conn) {
            Ok(snapshot) => Ok(snapshot),
            Err(Error::DeserializationFailed(msg)) => {
                warn!("Retained snapshot is unreadable, ignoring it: {}", msg);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn exists(conn: &Connection) -> Result<bool> {
        Ok(Self::load(conn)?.is_some())
    }

    pub fn delete(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM snapshot", [])?;
        Ok(())
    }
}
