// src/db/models/setting.rs

//! Key/value settings model

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, params};

/// A single persisted setting
pub struct Setting;

impl Setting {
    pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or replace a setting
    pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete(conn: &Connection, key: &str) -> Result<()> {
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_overwrite_delete() {
        let conn = crate::db::open_in_memory().unwrap();

        assert_eq!(Setting::get(&conn, "execution_mode").unwrap(), None);

        Setting::set(&conn, "execution_mode", "root").unwrap();
        assert_eq!(
            Setting::get(&conn, "execution_mode").unwrap().as_deref(),
            Some("root")
        );

        Setting::set(&conn, "execution_mode", "remote").unwrap();
        assert_eq!(
            Setting::get(&conn, "execution_mode").unwrap().as_deref(),
            Some("remote")
        );

        Setting::delete(&conn, "execution_mode").unwrap();
        assert_eq!(Setting::get(&conn, "execution_mode").unwrap(), None);
    }
}
