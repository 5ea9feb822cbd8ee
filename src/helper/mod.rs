// src/helper/mod.rs

//! The out-of-process elevated helper
//!
//! `appwarden helper` runs as root and serves the remote-service transport.
//! It holds a single-instance lock, authorizes callers by peer credentials,
//! validates every command again with the same policy the caller applied,
//! and runs one command at a time.

pub mod auth;
pub mod lock;
pub mod server;

pub use auth::{AuditAction, AuditEntry, AuditLogger, AuthChecker, PeerCredentials};
pub use lock::HelperLock;
pub use server::HelperState;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::policy::PolicyValidator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Run the helper until interrupted
///
/// Builds its own tokio runtime; the rest of the crate stays synchronous.
pub fn run(config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("appwarden-helper")
        .build()?;

    runtime.block_on(run_async(config))
}

async fn run_async(config: &Config) -> Result<()> {
    let helper = &config.helper;

    let _lock = HelperLock::try_acquire(&helper.lock_path)?.ok_or_else(|| {
        Error::Config(format!(
            "another helper holds {} (pid {})",
            helper.lock_path.display(),
            HelperLock::holder_pid(&helper.lock_path)
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        ))
    })?;

    let state = Arc::new(HelperState::new(
        AuthChecker::from_config(helper),
        PolicyValidator::from_config(&config.protected)?,
        Duration::from_secs(helper.command_timeout_secs),
    ));

    let listener = server::bind_socket(helper)?;
    info!(
        "Helper ready: {} granted uid(s), {} trusted gid(s)",
        helper.granted_uids.len(),
        helper.trusted_gids.len()
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let result = server::serve(listener, state, shutdown).await;
    server::remove_socket(&helper.socket_path);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandRequest;
    use crate::transport::{RemoteService, Transport};
    use std::thread;

    #[test]
    fn test_remote_service_against_helper() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.helper.socket_path = dir.path().join("helper.sock");
        config.helper.granted_uids = vec![unsafe { libc::getuid() }];

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let listener = runtime.block_on(async { server::bind_socket(&config.helper) }).unwrap();
        let state = Arc::new(HelperState::new(
            AuthChecker::from_config(&config.helper),
            PolicyValidator::from_config(&config.protected).unwrap(),
            Duration::from_secs(5),
        ));

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = thread::spawn(move || {
            runtime
                .block_on(server::serve(listener, state, async {
                    let _ = stop_rx.await;
                }))
                .unwrap();
        });

        let client = RemoteService::with_socket_path(&config.helper.socket_path, Duration::from_secs(5));
        assert!(client.is_available());
        client.ensure_ready().unwrap();

        let output = client.execute(&CommandRequest::new("id -u")).unwrap();
        assert_eq!(output.output.trim(), unsafe { libc::getuid() }.to_string());

        let err = client.execute(&CommandRequest::new("reboot")).unwrap_err();
        assert!(err.is_policy_rejection());

        stop_tx.send(()).unwrap();
        server.join().unwrap();
    }
}
