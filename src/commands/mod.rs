// src/commands/mod.rs
//! Command handlers for the appwarden CLI

mod action;
mod check;
mod history;
mod mode;
mod status;

pub use action::{cmd_action, cmd_rollback};
pub use check::cmd_check;
pub use history::{cmd_history, cmd_history_clear};
pub use mode::{cmd_mode_clear, cmd_mode_set, cmd_mode_show, cmd_mode_verify};
pub use status::cmd_status;

use anyhow::{Context, Result};
use appwarden::db::{self, paths};
use appwarden::{Config, ExecutionMode, ModeResolver, PolicyValidator, SystemTransports};
use rusqlite::Connection;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Everything a handler needs for one invocation
pub struct Session {
    pub config: Config,
    pub conn: Connection,
    pub transports: SystemTransports,
    pub validator: PolicyValidator,
}

impl Session {
    /// Load configuration and open the database
    ///
    /// Without an explicit `--db-path`, an unopenable system database falls
    /// back to the per-user location.
    pub fn open(config_path: &str, db_override: Option<&str>) -> Result<Self> {
        let mut config = Config::load(config_path)
            .with_context(|| format!("Failed to load configuration from {}", config_path))?;
        if let Some(path) = db_override {
            config.db_path = PathBuf::from(path);
        }

        let conn = match db::open(&config.db_path) {
            Ok(conn) => conn,
            Err(e) if db_override.is_none() => {
                let fallback = paths::user_db_path().with_context(|| {
                    format!("Failed to open {}: {}", config.db_path.display(), e)
                })?;
                warn!(
                    "Cannot open {} ({}); using {}",
                    config.db_path.display(),
                    e,
                    fallback.display()
                );
                config.db_path = fallback;
                db::open(&config.db_path).context("Failed to open appwarden database")?
            }
            Err(e) => return Err(e).context("Failed to open appwarden database"),
        };
        debug!("Database: {}", config.db_path.display());

        let validator = PolicyValidator::from_config(&config.protected)
            .context("Invalid protected package configuration")?;
        let transports = SystemTransports::new(&config);

        Ok(Self {
            config,
            conn,
            transports,
            validator,
        })
    }

    pub fn resolver(&self) -> ModeResolver<'_> {
        ModeResolver::new(&self.conn, &self.transports)
    }

    /// The active mode for this invocation
    pub fn resolve_mode(&self) -> Result<ExecutionMode> {
        self.resolver()
            .resolve()
            .context("Failed to resolve execution mode")
    }
}
