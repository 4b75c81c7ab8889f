//! Advisory file locks serializing installs of the same package.
//!
//! Each (provider, version, platform) key gets its own lock file under
//! `<cache>/.locks/`, so installs of different packages never wait on each
//! other while two processes installing the same package take turns. The
//! lock is released when the [`CacheLock`] is dropped.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::addrs::Provider;
use crate::source::{Platform, Version};

/// Name of the lock directory inside a cache directory.
pub const LOCKS_DIR: &str = ".locks";

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Wait until the lock for `key` is held.
    ///
    /// The lock is polled rather than waited on in a blocking call, so
    /// dropping the returned future (for example when a cancellation token
    /// fires in a `select!`) stops waiting immediately.
    pub async fn acquire(cache_dir: &Path, key: &str) -> Result<Self> {
        let locks_dir = cache_dir.join(LOCKS_DIR);
        tokio::fs::create_dir_all(&locks_dir)
            .await
            .with_context(|| format!("Failed to create directory {}", locks_dir.display()))?;

        let path = locks_dir.join(format!("{key}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        let mut waited = false;
        while !file
            .try_lock_exclusive()
            .with_context(|| format!("Failed to acquire lock: {}", path.display()))?
        {
            if !waited {
                debug!(target: "provman::cache", "waiting for {}", path.display());
                waited = true;
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }

        debug!(target: "provman::cache", "acquired {}", path.display());
        Ok(Self { file, path })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = self.file.unlock() {
            tracing::warn!(target: "provman::cache", "failed to unlock {}: {e}", self.path.display());
        }
    }
}

/// File-name-safe lock key for one package.
#[must_use]
pub fn package_lock_key(provider: &Provider, version: &Version, platform: &Platform) -> String {
    format!("{provider}_{version}_{platform}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_package_lock_key_is_file_safe() {
        let provider: Provider = "example.com:8443/acme/widget".parse().unwrap();
        let key =
            package_lock_key(&provider, &Version::new(1, 2, 3), &Platform::new("linux", "amd64"));
        assert_eq!(key, "example.com_8443_acme_widget_1.2.3_linux_amd64");
    }

    #[tokio::test]
    async fn test_lock_creates_locks_dir() {
        let temp = TempDir::new().unwrap();
        let _lock = CacheLock::acquire(temp.path(), "pkg").await.unwrap();
        assert!(temp.path().join(LOCKS_DIR).join("pkg.lock").exists());
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        let held = Arc::new(AtomicBool::new(false));

        let first = CacheLock::acquire(&dir, "pkg").await.unwrap();
        held.store(true, Ordering::SeqCst);

        let waiter = {
            let dir = dir.clone();
            let held = Arc::clone(&held);
            tokio::spawn(async move {
                let _second = CacheLock::acquire(&dir, "pkg").await.unwrap();
                // must only get here after the first lock is released
                assert!(!held.load(Ordering::SeqCst));
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        held.store(false, Ordering::SeqCst);
        drop(first);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_wait_does_not_hold_the_lock() {
        let temp = TempDir::new().unwrap();
        let first = CacheLock::acquire(temp.path(), "pkg").await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(150), CacheLock::acquire(temp.path(), "pkg")).await;
        assert!(waited.is_err());

        drop(first);
        let _again = CacheLock::acquire(temp.path(), "pkg").await.unwrap();
    }
}
