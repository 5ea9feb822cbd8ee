// src/db/paths.rs
//! Centralized path derivation for appwarden directories

use std::path::PathBuf;

/// User-level fallback database, used when the system path is not writable
pub fn user_db_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("appwarden").join("appwarden.db"))
}
