//! Client-side advisory lock.
//!
//! Every `relayctl send` takes an exclusive `flock(2)` on a shared lock file
//! before connecting, so concurrent invocations run their whole
//! connect/send/receive sequence one after another. The lock is released
//! when the guard drops, on every exit path.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

/// Errors from acquiring the client lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("failed to open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to lock {path}: {source}")]
    Acquire {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// An exclusive lock on the client lock file, held until dropped.
#[derive(Debug)]
pub struct ClientLock {
    file: File,
    path: PathBuf,
}

impl ClientLock {
    fn open(path: &Path) -> Result<File, LockError> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| LockError::Open {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Block until the lock at `path` is ours. The file is created if
    /// missing and never removed.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = Self::open(path)?;
        file.lock_exclusive().map_err(|source| LockError::Acquire {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "client lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Take the lock only if nobody else holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, LockError> {
        let file = Self::open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(source) => Err(LockError::Acquire {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ClientLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "client lock released");
    }
}
