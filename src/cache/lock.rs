//! Advisory file locking for cache entries.
//!
//! Each cache entry has a co-located lock file guarding its build. The lock
//! is an OS-level exclusive advisory lock; it is released when the
//! [`PayloadLock`] is dropped, while the lock file itself stays on disk for
//! the next builder.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::{debug, warn};

use crate::core::PayloadError;

/// An exclusive cross-process lock over one cache entry path.
pub struct PayloadLock {
    _file: File,
    path: PathBuf,
    waited: bool,
}

impl PayloadLock {
    /// Acquires the lock at `path`, blocking while a peer process holds it.
    ///
    /// [`waited`](Self::waited) reports afterwards whether this call had to
    /// wait, which the cache uses to tell a fresh build apart from a peer
    /// that died without publishing its entry.
    pub fn acquire(path: &Path) -> Result<Self, PayloadError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|err| PayloadError::FileSystemError {
                operation: format!("open lock file ({err})"),
                path: path.display().to_string(),
            })?;

        let waited = match file.try_lock_exclusive() {
            Ok(true) => false,
            Ok(false) | Err(_) => {
                debug!(lock = %path.display(), "waiting for a peer build to finish");
                file.lock_exclusive()
                    .map_err(|err| PayloadError::FileSystemError {
                        operation: format!("acquire lock ({err})"),
                        path: path.display().to_string(),
                    })?;
                true
            }
        };

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
            waited,
        })
    }

    /// Whether acquisition blocked on a peer holding the lock.
    pub fn waited(&self) -> bool {
        self.waited
    }
}

impl Drop for PayloadLock {
    fn drop(&mut self) {
        if let Err(err) = self._file.unlock() {
            warn!(lock = %self.path.display(), "failed to release lock: {err}");
        }
    }
}
