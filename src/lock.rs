//! Cross-process advisory locking
//!
//! The lock lives on a sidecar `<file>.lock` rather than on the data file
//! itself: compaction publishes a new inode by rename, and a lock held on
//! the old inode would stop excluding anyone.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::LockMode;
use crate::error::{FlatDocError, Result};

/// Shared for reads, exclusive for writes and maintenance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
}

/// Handle on the sidecar lock file
pub struct FileLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

/// Held lock; released on drop
pub struct LockGuard {
    file: File,
    kind: LockKind,
}

impl FileLock {
    /// Open (or create) the lock file belonging to `data_path`
    pub fn open(data_path: &Path, mode: LockMode) -> Result<Self> {
        let path = lock_path(data_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(Self { file, path, mode })
    }

    pub fn shared(&self) -> Result<LockGuard> {
        self.acquire(LockKind::Shared)
    }

    pub fn exclusive(&self) -> Result<LockGuard> {
        self.acquire(LockKind::Exclusive)
    }

    fn acquire(&self, kind: LockKind) -> Result<LockGuard> {
        let file = self.file.try_clone()?;

        let outcome = match (self.mode, kind) {
            (LockMode::Blocking, LockKind::Shared) => FileExt::lock_shared(&file),
            (LockMode::Blocking, LockKind::Exclusive) => FileExt::lock_exclusive(&file),
            (LockMode::NonBlocking, LockKind::Shared) => FileExt::try_lock_shared(&file),
            (LockMode::NonBlocking, LockKind::Exclusive) => FileExt::try_lock_exclusive(&file),
        };

        match outcome {
            Ok(()) => Ok(LockGuard { file, kind }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(FlatDocError::LockContention(format!(
                    "{:?} lock on {} is held by another handle",
                    kind,
                    self.path.display()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, kind = ?self.kind, "failed to release file lock");
        }
    }
}

/// `<data_path>.lock`
pub fn lock_path(data_path: &Path) -> PathBuf {
    let mut name = OsString::from(data_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}
