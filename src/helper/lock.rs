// src/helper/lock.rs

//! Single-instance lock for the helper service
//!
//! The helper holds an exclusive `flock` on its lock file for its whole
//! lifetime, so a second helper cannot bind over the first one's socket.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct HelperLock {
    /// Kept open to hold the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl HelperLock {
    /// Try to acquire the lock without blocking
    ///
    /// Returns `Ok(None)` when another process holds it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                info!("Acquired helper lock at {}", path.display());
                let lock = Self { file, path };
                lock.write_pid()?;
                Ok(Some(lock))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Helper lock already held at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Whether any process holds the lock
    pub fn is_held<P: AsRef<Path>>(path: P) -> bool {
        let Ok(file) = File::open(path.as_ref()) else {
            return false;
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(_) => true,
        }
    }

    /// PID recorded by the current holder
    pub fn holder_pid<P: AsRef<Path>>(lock_path: P) -> Option<u32> {
        fs::read_to_string(lock_path.as_ref().with_extension("pid"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    fn write_pid(&self) -> Result<()> {
        fs::write(self.path.with_extension("pid"), std::process::id().to_string())?;
        Ok(())
    }
}

impl Drop for HelperLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.path.with_extension("pid"));
        info!("Released helper lock at {}", self.path.display());
    }
}
