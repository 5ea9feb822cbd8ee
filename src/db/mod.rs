// src/db/mod.rs

//! Database layer for appwarden
//!
//! A single SQLite file holds every durable record: the selected execution
//! mode, the one retained state snapshot and the bounded action log. Each
//! write runs in a SQLite transaction, so a crash mid-write leaves either the
//! old or the new content.

pub mod models;
pub mod paths;
pub mod schema;

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

/// Open (creating if needed) the database and apply pending migrations
pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let db_path = db_path.as_ref();

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    debug!("Opened database {}", db_path.display());
    Ok(conn)
}

/// Open a private in-memory database (tests and dry runs)
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("state.db");

        let conn = open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(
            schema::get_schema_version(&conn).unwrap(),
            schema::SCHEMA_VERSION
        );
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db");

        drop(open(&db_path).unwrap());
        let conn = open(&db_path).unwrap();
        assert_eq!(
            schema::get_schema_version(&conn).unwrap(),
            schema::SCHEMA_VERSION
        );
    }
}
