// src/helper/server.rs

//! Axum router for the helper, served over its Unix socket
//!
//! Routes:
//!
//! | Method | Path                     | Access  |
//! |--------|--------------------------|---------|
//! | GET    | `/health`                | anyone  |
//! | GET    | `/v1/permission`         | anyone  |
//! | POST   | `/v1/permission/request` | anyone  |
//! | POST   | `/v1/exec`               | granted |
//!
//! Each connection is served by hyper's HTTP/1 server. The caller's
//! `SO_PEERCRED` identity is read once at accept and attached to every
//! request on that connection as an [`Extension`].

use crate::command::CommandRequest;
use crate::config::HelperConfig;
use crate::error::{Error, Result};
use crate::helper::auth::{AuditAction, AuditEntry, AuditLogger, AuthChecker, PeerCredentials};
use crate::policy::PolicyValidator;
use crate::transport::wire::{
    ErrorBody, ExecRequest, ExecResponse, PATH_EXEC, PATH_HEALTH, PATH_PERMISSION,
    PATH_PERMISSION_REQUEST, PermissionStatus,
};
use axum::{
    Extension, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Largest accepted request body
const MAX_BODY: usize = 64 * 1024;

/// Audit entries kept in memory
const AUDIT_CAPACITY: usize = 1000;

/// Shared helper state type
pub type SharedState = Arc<HelperState>;

/// Shared state of a running helper
pub struct HelperState {
    auth: AuthChecker,
    validator: PolicyValidator,
    audit: std::sync::Mutex<AuditLogger>,
    /// One command runs at a time
    exec_lock: Mutex<()>,
    command_timeout: Duration,
}

impl HelperState {
    pub fn new(auth: AuthChecker, validator: PolicyValidator, command_timeout: Duration) -> Self {
        Self {
            auth,
            validator,
            audit: std::sync::Mutex::new(AuditLogger::with_capacity(AUDIT_CAPACITY)),
            exec_lock: Mutex::new(()),
            command_timeout,
        }
    }

    fn audit(&self, entry: AuditEntry) {
        self.audit.lock().unwrap_or_else(|e| e.into_inner()).log(entry);
    }

    /// Number of audit entries currently retained
    pub fn audit_len(&self) -> usize {
        self.audit.lock().unwrap_or_else(|e| e.into_inner()).retained()
    }

    /// Run one command under `sh -c`, killing it on timeout
    async fn run_command(&self, command: &str, timeout: Duration) -> Result<ExecResponse> {
        let _running = self.exec_lock.lock().await;
        debug!("helper exec: {}", command);

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("Command timed out after {:?}: {}", timeout, command);
                return Err(Error::Timeout(timeout.as_secs()));
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ExecResponse {
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }

    /// Effective timeout: the caller's, capped by the helper's own
    fn timeout_for(&self, requested_secs: u64) -> Duration {
        match requested_secs {
            0 => self.command_timeout,
            secs => Duration::from_secs(secs).min(self.command_timeout),
        }
    }
}

/// Error reply carrying an [`ErrorBody`]
#[derive(Debug)]
pub struct ApiError(ErrorBody);

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        ApiError(ErrorBody::new(status.as_u16(), detail))
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::PolicyRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::TransportDenied(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [("content-type", "application/json")], Json(self.0)).into_response()
    }
}

/// Result type for route handlers
pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the helper's router
///
/// Handlers expect `PeerCredentials` as a request extension.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route(PATH_HEALTH, get(health_handler))
        .route(PATH_PERMISSION, get(permission_handler))
        .route(PATH_PERMISSION_REQUEST, post(permission_request_handler))
        .route(PATH_EXEC, post(exec_handler))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(MAX_BODY))
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn permission_handler(
    State(state): State<SharedState>,
    Extension(creds): Extension<PeerCredentials>,
) -> Json<PermissionStatus> {
    Json(permission(&state, &creds, AuditAction::PermissionQuery))
}

async fn permission_request_handler(
    State(state): State<SharedState>,
    Extension(creds): Extension<PeerCredentials>,
) -> Json<PermissionStatus> {
    Json(permission(&state, &creds, AuditAction::PermissionRequest))
}

fn permission(state: &HelperState, creds: &PeerCredentials, action: AuditAction) -> PermissionStatus {
    let granted = state.auth.is_granted(creds);
    state.audit(AuditEntry::new(*creds, action, granted));
    PermissionStatus { granted }
}

/// Body is parsed by hand so a malformed request is a 400, not axum's 422
async fn exec_handler(
    State(state): State<SharedState>,
    Extension(creds): Extension<PeerCredentials>,
    body: String,
) -> ApiResult<ExecResponse> {
    let request: ExecRequest = serde_json::from_str(&body).map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, format!("invalid exec request: {}", e))
    })?;

    if !state.auth.is_granted(&creds) {
        state.audit(AuditEntry::new(creds, AuditAction::Exec, false).with_details(&request.command));
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            format!("uid {} is not granted", creds.uid),
        ));
    }

    let command = match &request.target {
        Some(target) => CommandRequest::targeting(&request.command, target),
        None => CommandRequest::new(&request.command),
    };
    if let Err(e) = state.validator.check(&command) {
        state.audit(AuditEntry::new(creds, AuditAction::Exec, false).with_details(e.to_string()));
        return Err(e.into());
    }

    state.audit(AuditEntry::new(creds, AuditAction::Exec, true).with_details(&request.command));

    let response = state
        .run_command(command.command(), state.timeout_for(request.timeout_secs))
        .await?;
    Ok(Json(response))
}

async fn not_found_handler(uri: Uri) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, format!("no route for {}", uri.path()))
}

/// Bind the helper socket, replacing a stale socket file
pub fn bind_socket(config: &HelperConfig) -> Result<UnixListener> {
    let path = &config.socket_path;
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(path).map_err(|e| {
        Error::Config(format!("failed to bind helper socket {}: {}", path.display(), e))
    })?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(config.socket_mode))?;

    info!(
        "Listening on {} (mode: {:o})",
        path.display(),
        config.socket_mode
    );
    Ok(listener)
}

/// Accept connections until `shutdown` resolves
pub async fn serve<F>(listener: UnixListener, state: SharedState, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()>,
{
    let app = build_router(state);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => match PeerCredentials::from_socket(&stream) {
                    Ok(creds) => {
                        let app = app.clone().layer(Extension(creds));
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = TowerToHyperService::new(app);
                            if let Err(err) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                debug!("Error serving connection: {:?}", err);
                            }
                        });
                    }
                    Err(e) => warn!("Dropping connection without peer credentials: {}", e),
                },
                Err(e) => warn!("Accept failed: {}", e),
            },
            _ = &mut shutdown => {
                info!("Helper shutting down");
                return Ok(());
            }
        }
    }
}

/// Remove the socket file if it still exists
pub fn remove_socket(path: &Path) {
    if path.exists() && let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}
