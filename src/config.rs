// src/config.rs

//! Configuration file handling
//!
//! All keys are optional; a missing file yields the defaults below.
//!
//! ```toml
//! db_path = "/var/lib/appwarden/appwarden.db"
//! command_timeout_secs = 30
//!
//! [shell]
//! su_path = "su"
//!
//! [service]
//! socket_path = "/run/appwarden/helper.sock"
//!
//! [protected]
//! packages = ["com.android.systemui"]
//! patterns = ["com.android.phone*"]
//!
//! [helper]
//! granted_uids = [2000]
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/appwarden/config.toml";

/// Default database location
pub const DEFAULT_DB_PATH: &str = "/var/lib/appwarden/appwarden.db";

/// Default helper socket
pub const DEFAULT_SOCKET_PATH: &str = "/run/appwarden/helper.sock";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding mode, snapshot and action log
    pub db_path: PathBuf,
    /// Single per-command timeout applied by both transports
    pub command_timeout_secs: u64,
    /// Android user the package commands address
    pub user_id: u32,
    pub shell: ShellConfig,
    pub service: ServiceConfig,
    pub protected: ProtectedConfig,
    pub helper: HelperConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            command_timeout_secs: 30,
            user_id: 0,
            shell: ShellConfig::default(),
            service: ServiceConfig::default(),
            protected: ProtectedConfig::default(),
            helper: HelperConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Binary that opens the elevated shell
    pub su_path: String,
    /// Upper bound for the one-shot availability check
    pub check_timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            su_path: "su".to_string(),
            check_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Unix socket of the helper service
    pub socket_path: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

/// Static protected-package classification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectedConfig {
    /// Exact package names
    pub packages: Vec<String>,
    /// Glob patterns matched against package names
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub socket_path: PathBuf,
    /// Socket file mode
    pub socket_mode: u32,
    /// Lock file ensuring a single helper instance
    pub lock_path: PathBuf,
    /// UIDs holding a granted permission for the helper channel
    pub granted_uids: Vec<u32>,
    /// GIDs whose members are treated as granted
    pub trusted_gids: Vec<u32>,
    pub command_timeout_secs: u64,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            socket_mode: 0o660,
            lock_path: PathBuf::from("/run/appwarden/helper.lock"),
            granted_uids: Vec::new(),
            trusted_gids: vec![0],
            command_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when absent
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Per-command timeout
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn with_db_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.db_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.user_id, 0);
        assert_eq!(config.shell.su_path, "su");
        assert_eq!(config.helper.socket_mode, 0o660);
    }

    #[test]
    fn test_parse_partial() {
        let config = Config::parse(
            r#"
            command_timeout_secs = 5

            [protected]
            packages = ["com.android.systemui"]
            patterns = ["com.google.android.gms*"]
            "#,
        )
        .unwrap();

        assert_eq!(config.command_timeout_secs, 5);
        assert_eq!(config.protected.packages, vec!["com.android.systemui"]);
        assert_eq!(config.protected.patterns.len(), 1);
        // Untouched sections keep defaults
        assert_eq!(config.service.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
    }

    #[test]
    fn test_parse_invalid() {
        let err = Config::parse("command_timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.command_timeout_secs, 30);
    }
}
