// src/mode.rs

//! Execution mode selection
//!
//! The resolver decides which privilege transport is active for a session.
//! A persisted choice is trusted optimistically at resolve time; the
//! transport re-verifies actual privilege lazily on first use. With nothing
//! persisted, transports are checked in priority order and the first available
//! one is persisted. `ExecutionMode::None` is never persisted, so the next
//! resolve checks again.

use crate::db::models::Setting;
use crate::error::Result;
use crate::transport::TransportProvider;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumString};
use tracing::{debug, info, warn};

/// Settings key holding the persisted mode
pub const MODE_SETTING_KEY: &str = "execution_mode";

/// Which privilege transport carries commands
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionMode {
    /// Long-lived elevated shell
    Root,
    /// Out-of-process elevated helper reached over a socket
    #[strum(to_string = "remote")]
    #[serde(rename = "remote")]
    RemoteService,
    /// No privilege backend; nothing mutating can run
    None,
}

impl ExecutionMode {
    /// Transports checked when no mode is persisted, highest priority first
    pub const PRIORITY_ORDER: [ExecutionMode; 2] = [ExecutionMode::Root, ExecutionMode::RemoteService];

    pub fn is_privileged(&self) -> bool {
        !matches!(self, ExecutionMode::None)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExecutionMode::Root => "root shell",
            ExecutionMode::RemoteService => "remote helper service",
            ExecutionMode::None => "none (view-only)",
        }
    }
}

/// What the user wants after the active mode stopped working
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeLossChoice {
    /// Try the same operation again with the same mode
    Retry,
    /// Pick another transport
    SwitchMode,
    /// Keep going without mutating anything
    ViewOnly,
}

/// Resolves, persists and verifies the execution mode
pub struct ModeResolver<'a> {
    conn: &'a Connection,
    provider: &'a dyn TransportProvider,
}

impl<'a> ModeResolver<'a> {
    pub fn new(conn: &'a Connection, provider: &'a dyn TransportProvider) -> Self {
        Self { conn, provider }
    }

    /// The persisted mode, if any
    ///
    /// An unreadable value is treated as absent.
    pub fn persisted(&self) -> Result<Option<ExecutionMode>> {
        let Some(value) = Setting::get(self.conn, MODE_SETTING_KEY)? else {
            return Ok(None);
        };

        match ExecutionMode::from_str(&value) {
            Ok(ExecutionMode::None) => Ok(None),
            Ok(mode) => Ok(Some(mode)),
            Err(_) => {
                warn!("Ignoring unreadable persisted mode '{}'", value);
                Ok(None)
            }
        }
    }

    /// Decide the active mode for this session
    pub fn resolve(&self) -> Result<ExecutionMode> {
        if let Some(mode) = self.persisted()? {
            debug!("Using persisted mode: {}", mode);
            return Ok(mode);
        }

        for mode in ExecutionMode::PRIORITY_ORDER {
            let transport = self.provider.open(mode);
            if transport.is_available() {
                info!("Detected available transport: {}", mode.display_name());
                Setting::set(self.conn, MODE_SETTING_KEY, &mode.to_string())?;
                return Ok(mode);
            }
            debug!("Transport {} not available", mode);
        }

        info!("No privileged transport available");
        Ok(ExecutionMode::None)
    }

    /// Persist an explicit user choice
    ///
    /// Choosing `None` clears the record instead of writing it.
    pub fn select(&self, mode: ExecutionMode) -> Result<()> {
        match mode {
            ExecutionMode::None => self.clear(),
            _ => {
                info!("Persisting mode: {}", mode);
                Setting::set(self.conn, MODE_SETTING_KEY, &mode.to_string())
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        Setting::delete(self.conn, MODE_SETTING_KEY)
    }

    /// Cheap grant check, safe to call frequently
    pub fn is_granted(&self, mode: ExecutionMode) -> bool {
        self.provider.open(mode).is_granted()
    }

    /// Active check that may block on an OS consent prompt
    ///
    /// Only call this on explicit user action.
    pub fn verify(&self, mode: ExecutionMode) -> Result<()> {
        self.provider.open(mode).request_access()
    }
}
