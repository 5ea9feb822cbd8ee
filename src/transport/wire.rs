// src/transport/wire.rs

//! JSON bodies exchanged with the helper service

use serde::{Deserialize, Serialize};

/// Helper health endpoint
pub const PATH_HEALTH: &str = "/health";
/// Permission status for the calling peer
pub const PATH_PERMISSION: &str = "/v1/permission";
/// Ask the helper to (re)evaluate the caller's grant
pub const PATH_PERMISSION_REQUEST: &str = "/v1/permission/request";
/// Run one command
pub const PATH_EXEC: &str = "/v1/exec";

/// Body of `POST /v1/exec`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub timeout_secs: u64,
}

/// Reply to a command that ran to completion, whatever its exit code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResponse {
    pub exit_code: i32,
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatus {
    pub granted: bool,
}

/// Error body for every non-2xx reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub detail: String,
}

impl ErrorBody {
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}
