// src/transport/service.rs

//! Remote helper service transport
//!
//! Commands are forwarded to the elevated helper (`appwarden helper`) as
//! HTTP/1.1 requests over its Unix socket. Availability needs two things:
//! the socket answers, and the helper has granted this caller's UID. The
//! failures differ so the caller can pick the right remedy:
//!
//! - socket unreachable: `TransportUnavailable` (start or restart the helper)
//! - permission missing: `TransportDenied` (re-request the grant)

use crate::command::{CommandOutput, CommandRequest};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mode::ExecutionMode;
use crate::transport::Transport;
use crate::transport::wire::{
    ErrorBody, ExecRequest, ExecResponse, PATH_EXEC, PATH_HEALTH, PATH_PERMISSION,
    PATH_PERMISSION_REQUEST, PermissionStatus,
};
use serde::de::DeserializeOwned;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, TryLockError};
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for health and permission round trips
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time granted on top of the command timeout for the reply to arrive
const REPLY_GRACE: Duration = Duration::from_secs(5);

/// HTTP response from the helper
struct HttpResponse {
    status_code: u16,
    body: String,
}

/// Transport backed by the helper service
pub struct RemoteService {
    socket_path: PathBuf,
    timeout: Duration,
    /// Set once health and permission were confirmed; cleared on mode loss
    ready: AtomicBool,
    /// One request in flight on the channel
    channel: Mutex<()>,
}

impl RemoteService {
    pub fn new(config: &Config) -> Self {
        Self::with_socket_path(&config.service.socket_path, config.command_timeout())
    }

    pub fn with_socket_path<P: AsRef<Path>>(socket_path: P, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            timeout,
            ready: AtomicBool::new(false),
            channel: Mutex::new(()),
        }
    }

    /// Check that the helper answers
    pub fn health(&self) -> Result<()> {
        self.request("GET", PATH_HEALTH, None, CONTROL_TIMEOUT)
            .and_then(|r| self.check_status(r))
            .map(|_| ())
    }

    /// Whether the helper currently grants this caller
    pub fn permission(&self) -> Result<bool> {
        let response = self.request("GET", PATH_PERMISSION, None, CONTROL_TIMEOUT)?;
        let status: PermissionStatus = self.parse_response(response)?;
        Ok(status.granted)
    }

    fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
        read_timeout: Duration,
    ) -> Result<HttpResponse> {
        let mut stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            Error::TransportUnavailable(format!(
                "helper not reachable at {}: {}",
                self.socket_path.display(),
                e
            ))
        })?;
        stream.set_read_timeout(Some(read_timeout))?;
        stream.set_write_timeout(Some(CONTROL_TIMEOUT))?;

        let content_length = body.map(|b| b.len()).unwrap_or(0);
        let mut request = format!(
            "{} {} HTTP/1.1\r\n\
             Host: localhost\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            method, path, content_length
        );
        if let Some(body) = body {
            request.push_str(body);
        }

        stream.write_all(request.as_bytes()).map_err(|e| {
            Error::TransportUnavailable(format!("helper connection lost: {}", e))
        })?;

        let mut response = String::new();
        if let Err(e) = stream.read_to_string(&mut response) {
            return Err(match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout(self.timeout.as_secs()),
                _ => Error::TransportUnavailable(format!("helper connection lost: {}", e)),
            });
        }

        parse_http_response(&response)
    }

    /// Map non-2xx replies onto the error taxonomy
    fn check_status(&self, response: HttpResponse) -> Result<HttpResponse> {
        if (200..300).contains(&response.status_code) {
            return Ok(response);
        }

        let detail = serde_json::from_str::<ErrorBody>(&response.body)
            .map(|e| e.detail)
            .unwrap_or_else(|_| response.body.trim().to_string());

        Err(match response.status_code {
            403 => Error::TransportDenied(detail),
            422 => Error::PolicyRejected(detail),
            503 => Error::TransportUnavailable(detail),
            504 => Error::Timeout(self.timeout.as_secs()),
            code => Error::Protocol(format!("helper error ({}): {}", code, detail)),
        })
    }

    fn parse_response<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T> {
        let response = self.check_status(response)?;
        serde_json::from_str(&response.body)
            .map_err(|e| Error::Protocol(format!("malformed helper reply: {}", e)))
    }

    /// Send one command; the caller holds the channel lock
    fn exec_locked(&self, request: &CommandRequest) -> Result<CommandOutput> {
        debug!("remote helper: {}", request);

        let body = serde_json::to_string(&ExecRequest {
            command: request.command().to_string(),
            target: request.target().map(str::to_string),
            timeout_secs: self.timeout.as_secs(),
        })
        .map_err(|e| Error::Protocol(e.to_string()))?;

        let result = self
            .request("POST", PATH_EXEC, Some(&body), self.timeout + REPLY_GRACE)
            .and_then(|r| self.parse_response::<ExecResponse>(r));

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_mode_loss() {
                    warn!("Helper transport lost: {}", e);
                    self.ready.store(false, Ordering::SeqCst);
                }
                return Err(e);
            }
        };

        if reply.exit_code != 0 {
            return Err(Error::ExecutionFailed {
                code: reply.exit_code,
                message: reply.output.trim().to_string(),
            });
        }
        Ok(CommandOutput::new(reply.exit_code, reply.output))
    }
}

fn parse_http_response(response: &str) -> Result<HttpResponse> {
    let (head, body) = response
        .split_once("\r\n\r\n")
        .or_else(|| response.split_once("\n\n"))
        .unwrap_or((response, ""));

    let status_line = head
        .lines()
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| Error::Protocol("empty response from helper".to_string()))?;

    let status_code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("bad status line '{}'", status_line)))?;

    Ok(HttpResponse {
        status_code,
        body: body.to_string(),
    })
}

impl Transport for RemoteService {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::RemoteService
    }

    fn is_granted(&self) -> bool {
        if self.ready.load(Ordering::SeqCst) {
            return true;
        }
        self.socket_path.exists() && self.permission().unwrap_or(false)
    }

    fn request_access(&self) -> Result<()> {
        let response = self.request("POST", PATH_PERMISSION_REQUEST, Some("{}"), CONTROL_TIMEOUT)?;
        let status: PermissionStatus = self.parse_response(response)?;
        if !status.granted {
            return Err(Error::TransportDenied(
                "helper declined to grant this user".to_string(),
            ));
        }
        self.ensure_ready()
    }

    fn is_available(&self) -> bool {
        self.health().is_ok() && self.permission().unwrap_or(false)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ready.load(Ordering::SeqCst) {
            return Ok(());
        }

        let _channel = self.channel.lock().unwrap_or_else(|e| e.into_inner());
        self.health()?;
        if !self.permission()? {
            return Err(Error::TransportDenied(
                "permission for the helper channel is not granted".to_string(),
            ));
        }

        debug!("Helper service at {} is ready", self.socket_path.display());
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn execute(&self, request: &CommandRequest) -> Result<CommandOutput> {
        self.ensure_ready()?;
        let _channel = self.channel.lock().unwrap_or_else(|e| e.into_inner());
        self.exec_locked(request)
    }

    fn try_execute(&self, request: &CommandRequest) -> Result<Option<CommandOutput>> {
        if !self.ready.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let _channel = match self.channel.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };
        self.exec_locked(request).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;

    /// Serve canned replies, one connection per entry, in order
    fn serve(listener: UnixListener, replies: Vec<(u16, &'static str)>) -> thread::JoinHandle<Vec<String>> {
        thread::spawn(move || {
            let mut requests = Vec::new();
            for (status, body) in replies {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).unwrap();
                requests.push(String::from_utf8_lossy(&buf[..n]).to_string());
                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(reply.as_bytes()).unwrap();
            }
            requests
        })
    }

    #[test]
    fn test_unreachable_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let service = RemoteService::with_socket_path(dir.path().join("none.sock"), Duration::from_secs(1));

        assert!(!service.is_available());
        assert!(!service.is_granted());
        assert!(matches!(
            service.ensure_ready(),
            Err(Error::TransportUnavailable(_))
        ));
    }

    #[test]
    fn test_missing_permission_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = serve(listener, vec![(200, r#"{"status":"ok"}"#), (200, r#"{"granted":false}"#)]);

        let service = RemoteService::with_socket_path(&path, Duration::from_secs(1));
        assert!(matches!(
            service.ensure_ready(),
            Err(Error::TransportDenied(_))
        ));
        server.join().unwrap();
    }

    #[test]
    fn test_execute_maps_replies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = serve(
            listener,
            vec![
                (200, r#"{"status":"ok"}"#),
                (200, r#"{"granted":true}"#),
                (200, r#"{"exit_code":0,"output":"Success\n"}"#),
                (200, r#"{"exit_code":1,"output":"Unknown package\n"}"#),
                (422, r#"{"status":422,"detail":"blocked"}"#),
                (403, r#"{"status":403,"detail":"revoked"}"#),
            ],
        );

        let service = RemoteService::with_socket_path(&path, Duration::from_secs(1));
        let output = service
            .execute(&CommandRequest::targeting("pm enable com.a", "com.a"))
            .unwrap();
        assert_eq!(output.output, "Success\n");

        assert!(matches!(
            service.execute(&CommandRequest::new("pm enable com.b")),
            Err(Error::ExecutionFailed { code: 1, .. })
        ));
        assert!(matches!(
            service.execute(&CommandRequest::new("pm enable com.c")),
            Err(Error::PolicyRejected(_))
        ));
        assert!(matches!(
            service.execute(&CommandRequest::new("pm enable com.d")),
            Err(Error::TransportDenied(_))
        ));
        // Mode loss clears the cached readiness
        assert!(service.try_execute(&CommandRequest::new("id")).unwrap().is_none());

        let requests = server.join().unwrap();
        assert!(requests[2].starts_with("POST /v1/exec HTTP/1.1"));
        assert!(requests[2].contains(r#""target":"com.a""#));
    }

    #[test]
    fn test_gateway_timeout_is_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = serve(listener, vec![(504, r#"{"status":504,"detail":"timed out"}"#)]);

        let service = RemoteService::with_socket_path(&path, Duration::from_secs(3));
        let err = service
            .exec_locked(&CommandRequest::new("sleep 60"))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(3)));
        server.join().unwrap();
    }

    #[test]
    fn test_silent_helper_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).unwrap();
            // Keep the connection open without replying
            let _ = done_rx.recv();
        });

        // The read waits for the command timeout plus the reply grace
        let service = RemoteService::with_socket_path(&path, Duration::from_millis(100));
        let err = service
            .exec_locked(&CommandRequest::new("sleep 60"))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));

        done_tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn test_parse_http_response() {
        let response =
            parse_http_response("HTTP/1.1 504 Gateway Timeout\r\nX: y\r\n\r\n{\"a\":1}").unwrap();
        assert_eq!(response.status_code, 504);
        assert_eq!(response.body, "{\"a\":1}");

        assert!(parse_http_response("").is_err());
    }
}
