// src/db/models/mod.rs

//! Data models for appwarden database records
//!
//! Each struct maps to one table and owns the SQL that reads and writes it.

mod action_log;
mod setting;
mod snapshot;

pub use action_log::{ActionLogEntry, MAX_LOG_ENTRIES};
pub use setting::Setting;
pub use snapshot::SnapshotRecord;
