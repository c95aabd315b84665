//! Per-model advisory filesystem lock.
//!
//! Guards staging + publish for one model name against concurrent writers,
//! both across processes and within one process (flock conflicts apply per
//! open file description). The lock is released when the guard is dropped or
//! the process exits, so a crashed holder never wedges later invocations.

use crate::error::{MallowError, Result};
use crate::models::registry::Registry;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Exclusive lock over one model's staging + publish window.
pub struct ModelLock {
    _file: File,
    name: String,
    lock_path: PathBuf,
}

impl ModelLock {
    /// Try to take the lock without waiting.
    ///
    /// Fails with `AlreadyInProgress` when another invocation holds it.
    pub fn try_acquire(registry: &Registry, name: &str) -> Result<Self> {
        let lock_path = registry.lock_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(model = name, path = %lock_path.display(), "Acquired model lock");
                Ok(Self {
                    _file: file,
                    name: name.to_string(),
                    lock_path,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(MallowError::AlreadyInProgress {
                    name: name.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Take the lock, waiting up to `wait` if another invocation holds it.
    ///
    /// Polls until the lock frees or the bound expires, then fails with
    /// `AlreadyInProgress` rather than blocking indefinitely.
    pub async fn acquire(registry: &Registry, name: &str, wait: Duration) -> Result<Self> {
        let start = Instant::now();

        loop {
            match Self::try_acquire(registry, name) {
                Ok(lock) => return Ok(lock),
                Err(MallowError::AlreadyInProgress { .. }) => {
                    let elapsed = start.elapsed();
                    if elapsed >= wait {
                        return Err(MallowError::AlreadyInProgress {
                            name: name.to_string(),
                        });
                    }
                    info!(
                        model = name,
                        elapsed_secs = elapsed.as_secs(),
                        wait_secs = wait.as_secs(),
                        "Waiting for in-flight download..."
                    );
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for ModelLock {
    fn drop(&mut self) {
        debug!(model = %self.name, path = %self.lock_path.display(), "Released model lock");
    }
}
