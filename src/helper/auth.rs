// src/helper/auth.rs

//! Caller authorization for the helper service
//!
//! The helper identifies callers by `SO_PEERCRED` on the Unix socket.
//!
//! - **Root** (UID 0): always granted
//! - **Granted UIDs** from `[helper] granted_uids`: granted
//! - **Trusted GIDs** from `[helper] trusted_gids`: granted
//! - **Everyone else**: may query health and permission status, nothing more

use crate::config::HelperConfig;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::io;
use std::os::unix::io::AsRawFd;
use strum_macros::Display;
use tracing::{info, warn};

/// Peer credentials from a Unix socket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: u32,
    pub uid: u32,
    pub gid: u32,
}

impl PeerCredentials {
    /// Read the credentials of the process on the other end of `socket`
    pub fn from_socket<S: AsRawFd>(socket: &S) -> io::Result<Self> {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            let fd = socket.as_raw_fd();
            let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
            let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

            let result = unsafe {
                libc::getsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    libc::SO_PEERCRED,
                    &mut cred as *mut _ as *mut libc::c_void,
                    &mut len,
                )
            };

            if result == -1 {
                return Err(io::Error::last_os_error());
            }

            Ok(PeerCredentials {
                pid: cred.pid as u32,
                uid: cred.uid,
                gid: cred.gid,
            })
        }

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            let _ = socket;
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Peer credentials not supported on this platform",
            ))
        }
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

/// Decides which callers hold the helper permission
#[derive(Debug, Clone, Default)]
pub struct AuthChecker {
    granted_uids: Vec<u32>,
    trusted_gids: Vec<u32>,
}

impl AuthChecker {
    pub fn new(granted_uids: Vec<u32>, trusted_gids: Vec<u32>) -> Self {
        Self {
            granted_uids,
            trusted_gids,
        }
    }

    pub fn from_config(config: &HelperConfig) -> Self {
        Self::new(config.granted_uids.clone(), config.trusted_gids.clone())
    }

    pub fn is_granted(&self, creds: &PeerCredentials) -> bool {
        creds.is_root()
            || self.granted_uids.contains(&creds.uid)
            || self.trusted_gids.contains(&creds.gid)
    }
}

/// Audited helper operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum AuditAction {
    PermissionQuery,
    PermissionRequest,
    Exec,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub credentials: PeerCredentials,
    pub action: AuditAction,
    pub allowed: bool,
    pub details: Option<String>,
}

impl AuditEntry {
    pub fn new(credentials: PeerCredentials, action: AuditAction, allowed: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            credentials,
            action,
            allowed,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn to_log_message(&self) -> String {
        format!(
            "{} {} uid={} gid={} pid={} {}",
            if self.allowed { "ALLOWED" } else { "DENIED" },
            self.action,
            self.credentials.uid,
            self.credentials.gid,
            self.credentials.pid,
            self.details.as_deref().unwrap_or("")
        )
    }
}

/// Bounded in-memory audit trail, mirrored to the log
pub struct AuditLogger {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
}

impl AuditLogger {
    /// Logger keeping at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn log(&mut self, entry: AuditEntry) {
        let msg = entry.to_log_message();
        if entry.allowed {
            info!("AUDIT: {}", msg);
        } else {
            warn!("AUDIT: {}", msg);
        }

        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Number of entries currently retained
    pub fn retained(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(uid: u32, gid: u32) -> PeerCredentials {
        PeerCredentials { pid: 42, uid, gid }
    }

    #[test]
    fn test_grants() {
        let checker = AuthChecker::new(vec![2000], vec![3003]);
        assert!(checker.is_granted(&creds(0, 0)));
        assert!(checker.is_granted(&creds(2000, 2000)));
        assert!(checker.is_granted(&creds(10123, 3003)));
        assert!(!checker.is_granted(&creds(10123, 10123)));
    }

    #[test]
    fn test_default_checker_grants_root_only() {
        let checker = AuthChecker::default();
        assert!(checker.is_granted(&creds(0, 1)));
        assert!(!checker.is_granted(&creds(1000, 1000)));
    }

    #[test]
    fn test_audit_logger_is_bounded() {
        let mut logger = AuditLogger::with_capacity(3);
        for uid in 0..5 {
            logger.log(AuditEntry::new(creds(uid, uid), AuditAction::Exec, uid == 0));
        }
        assert_eq!(logger.retained(), 3);
        // Oldest entries are evicted first
        let uids: Vec<u32> = logger.entries.iter().map(|e| e.credentials.uid).collect();
        assert_eq!(uids, vec![2, 3, 4]);
    }

    #[test]
    fn test_log_message() {
        let entry = AuditEntry::new(creds(2000, 2000), AuditAction::Exec, false)
            .with_details("pm clear com.a");
        let msg = entry.to_log_message();
        assert!(msg.starts_with("DENIED exec uid=2000"));
        assert!(msg.ends_with("pm clear com.a"));
    }

    #[test]
    fn test_credentials_of_socket_pair() {
        let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
        let creds = PeerCredentials::from_socket(&a).unwrap();
        assert_eq!(creds.pid, std::process::id());
    }
}
