// src/error.rs

//! Error types for appwarden
//!
//! The first block of variants is the failure taxonomy every transport, gate
//! and orchestrator call reports through. The remaining variants carry
//! ambient failures (database, I/O, configuration, helper protocol).

use thiserror::Error;

/// Result type used across the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Command or target blocked before submission
    #[error("Rejected by policy: {0}")]
    PolicyRejected(String),

    /// No privilege backend is ready
    #[error("Privileged transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Channel reachable but permission absent or revoked
    #[error("Privileged transport denied: {0}")]
    TransportDenied(String),

    /// Command ran and reported a failure
    #[error("Command failed (exit code {code}): {message}")]
    ExecutionFailed { code: i32, message: String },

    /// Command did not finish within the per-command timeout
    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    /// Rollback requested with no retained snapshot
    #[error("No snapshot retained; nothing to roll back")]
    SnapshotMissing,

    /// A persisted record could not be decoded
    #[error("Failed to decode persisted record: {0}")]
    DeserializationFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed reply from the helper service
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Whether this failure means the privileged mode believed active is gone
    ///
    /// Callers surface a retry / switch-mode / view-only choice for these
    /// instead of silently degrading.
    pub fn is_mode_loss(&self) -> bool {
        matches!(
            self,
            Error::TransportUnavailable(_) | Error::TransportDenied(_)
        )
    }

    /// Whether this failure was decided before anything was submitted
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Error::PolicyRejected(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::DeserializationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_loss_classification() {
        assert!(Error::TransportUnavailable("gone".into()).is_mode_loss());
        assert!(Error::TransportDenied("revoked".into()).is_mode_loss());
        assert!(!Error::Timeout(30).is_mode_loss());
        assert!(
            !Error::ExecutionFailed {
                code: 1,
                message: "boom".into()
            }
            .is_mode_loss()
        );
    }

    #[test]
    fn test_display_messages() {
        let err = Error::ExecutionFailed {
            code: 255,
            message: "Unknown package".into(),
        };
        assert_eq!(
            err.to_string(),
            "Command failed (exit code 255): Unknown package"
        );
        assert_eq!(
            Error::Timeout(30).to_string(),
            "Command timed out after 30 seconds"
        );
    }
}
