//! File-based locking to prevent concurrent execution.
//!
//! Every pass through the pipeline's critical section takes an exclusive
//! flock-style advisory lock, so two processes never rewrite the store or the
//! dnsmasq files at the same time. Inside one process the pipeline's mutex
//! does the same job. The lock is held per section, not per process: a
//! running daemon only holds it while a scheduled job is working.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::info;

/// A guard that holds an exclusive lock on the lock file.
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Attempt to acquire an exclusive lock on `path`.
    /// Returns an error if another instance holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let lock_path = path.as_ref();
        let file = open_lock_file(lock_path)?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another pidns process is already running.\n\
                 If you believe this is an error, remove the lock file: {}\n\
                 Or wait for the other process to complete.",
                lock_path.display()
            )
        })?;

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }

    /// Acquire the lock, blocking until the current holder releases it.
    pub fn acquire_blocking(path: impl AsRef<Path>) -> Result<Self> {
        let lock_path = path.as_ref();
        let file = open_lock_file(lock_path)?;

        if file.try_lock_exclusive().is_err() {
            info!("Waiting for another pidns process to finish...");
            file.lock_exclusive()
                .with_context(|| format!("Failed to lock {}", lock_path.display()))?;
        }

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }

    /// [`LockGuard::acquire_blocking`] off the async runtime.
    pub async fn wait(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire_blocking(path))
            .await
            .context("Lock task panicked")?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).ok();
    }

    // create+read+write without truncation: no race between creating
    // the file and locking it
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

    fs::set_permissions(lock_path, fs::Permissions::from_mode(0o600))
        .context("Failed to set lock file permissions")?;

    Ok(file)
}
