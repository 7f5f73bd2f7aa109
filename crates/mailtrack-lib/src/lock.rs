//! Advisory per-issue file lock.
//!
//! Writers to one issue folder serialize through an exclusive `flock` on
//! `<issue>/tmp/.lock`. The lock is held by the open file handle inside
//! [`IssueLock`] and released when the guard is dropped, so every exit path
//! (including `?` propagation and panics) unlocks.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use rand::Rng;
use tracing::{debug, trace};

use crate::error::{Result, TrackerError};

/// Default upper bound on the time spent waiting for a lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const BASE_BACKOFF_MS: u64 = 20;
const MAX_BACKOFF_MS: u64 = 500;

/// Guard for a held issue lock.
#[derive(Debug)]
pub struct IssueLock {
    path: PathBuf,
    file: Option<File>,
}

impl IssueLock {
    /// Acquire an exclusive lock on `path`, retrying with exponential
    /// backoff until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if another holder keeps the lock past `timeout`,
    /// or `Io` if the lock file cannot be opened.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let start = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(path = %path.display(), attempts = attempt + 1, "Acquired issue lock");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        file: Some(file),
                    });
                }
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {}
                Err(err) => return Err(TrackerError::Io(err)),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(TrackerError::LockTimeout {
                    path: path.to_path_buf(),
                    waited_ms: elapsed.as_millis(),
                });
            }

            let base = (BASE_BACKOFF_MS << attempt.min(5)).min(MAX_BACKOFF_MS);
            let jitter = rand::rng().random_range(0..=base / 2);
            let remaining = timeout.saturating_sub(elapsed);
            let sleep = Duration::from_millis(base + jitter).min(remaining);
            trace!(path = %path.display(), ?sleep, "Issue lock contended, backing off");
            std::thread::sleep(sleep);
            attempt = attempt.saturating_add(1);
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock now instead of at drop.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the unlock call fails.
    pub fn unlock(mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            FileExt::unlock(&file)?;
            debug!(path = %self.path.display(), "Released issue lock");
        }
        Ok(())
    }
}

impl Drop for IssueLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
            debug!(path = %self.path.display(), "Released issue lock on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_excludes_second_holder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tmp").join(".lock");

        let held = IssueLock::acquire(&path, DEFAULT_LOCK_TIMEOUT).unwrap();
        let err = IssueLock::acquire(&path, Duration::from_millis(60)).unwrap_err();
        assert!(matches!(err, TrackerError::LockTimeout { .. }));

        held.unlock().unwrap();
        let again = IssueLock::acquire(&path, Duration::from_millis(60)).unwrap();
        assert_eq!(again.path(), path.as_path());
    }

    #[test]
    fn test_drop_releases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        {
            let _guard = IssueLock::acquire(&path, DEFAULT_LOCK_TIMEOUT).unwrap();
        }
        assert!(IssueLock::acquire(&path, Duration::from_millis(60)).is_ok());
        assert!(path.exists());
    }
}
