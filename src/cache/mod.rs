//! Payload cache with cross-process build arbitration
//!
//! Built payload containers are expensive to produce (parse, resolve,
//! assemble, encode) and identical across invocations of the same task, so
//! they are cached on disk and shared between worker processes. This module
//! provides the cache itself plus the advisory-lock protocol that lets many
//! workers race for the same entry while at most one builds it.
//!
//! # Cache Layout
//!
//! One file per `(task identity, compression)` pair, with a co-located lock
//! file per entry:
//! ```text
//! <cache_dir>/
//! ├── bosun.tasks.ping-deflated            # JSON cache entry
//! ├── bosun.tasks.ping-deflated.lock       # its build lock
//! └── bosun_packs.acme.net.plugins.tasks.probe-stored
//! ```
//!
//! The default location comes from the platform cache directory
//! (`~/.cache/bosun/payload_cache` on Linux); `BOSUN_CACHE_DIR` overrides it.
//!
//! # Concurrency Protocol
//!
//! - **Fast path**: a published entry is read with no locking at all.
//!   Publication is temp-then-rename, so a reader never sees a partial file.
//! - **Slow path**: the builder takes the entry's advisory lock, re-checks
//!   for an entry a peer may have published while it waited, and otherwise
//!   builds and publishes under the lock.
//! - A worker that had to wait for the lock and still finds no entry
//!   afterwards reports [`PayloadError::PeerBuildFailure`] instead of
//!   rebuilding: the peer it waited on died without publishing, and its
//!   failure will carry the diagnostics.

pub mod lock;

pub use lock::PayloadLock;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::Compression;
use crate::constants::LOCK_SUFFIX;
use crate::core::PayloadError;
use crate::pysrc::TaskMetadata;
use crate::utils::{atomic_write, ensure_dir};

/// Durable record of one built payload container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Base64 text of the zip container.
    pub container_b64: String,
    /// Metadata extracted from the entrypoint at build time.
    pub metadata: TaskMetadata,
}

/// On-disk cache of built payload containers.
pub struct PayloadCache {
    root: PathBuf,
}

impl PayloadCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Entry path for a task identity and compression choice.
    pub fn entry_path(&self, task_fqn: &str, compression: Compression) -> PathBuf {
        self.root.join(format!("{task_fqn}-{compression}"))
    }

    /// Fetches the entry for `task_fqn`, calling `build` to create it on
    /// first use.
    ///
    /// Concurrent callers for the same entry are serialized by an advisory
    /// lock; `build` runs at most once per published entry.
    pub fn get_or_build<F>(
        &self,
        task_fqn: &str,
        compression: Compression,
        build: F,
    ) -> Result<CacheEntry>
    where
        F: FnOnce() -> Result<CacheEntry>,
    {
        let path = self.entry_path(task_fqn, compression);
        if path.exists() {
            debug!(entry = %path.display(), "using cached payload");
            return Ok(read_entry(&path)?);
        }

        ensure_dir(&self.root)?;
        let lock_path = lock_path_for(&path);
        debug!(entry = %path.display(), "acquiring build lock");
        let lock = PayloadLock::acquire(&lock_path)?;
        debug!(entry = %path.display(), waited = lock.waited(), "build lock acquired");

        if path.exists() {
            // A peer published the entry while we were taking the lock.
            debug!(entry = %path.display(), "reading payload published by a peer");
            return match read_entry(&path) {
                Ok(entry) => Ok(entry),
                Err(PayloadError::IoError(_)) => Err(PayloadError::PeerBuildFailure {
                    entry: entry_file_name(&path),
                }
                .into()),
                Err(other) => Err(other.into()),
            };
        }

        if lock.waited() {
            // We waited on a peer building this entry, yet nothing appeared.
            return Err(PayloadError::PeerBuildFailure {
                entry: entry_file_name(&path),
            }
            .into());
        }

        debug!(entry = %path.display(), "creating payload");
        let entry = build()?;
        let serialized =
            serde_json::to_vec(&entry).context("failed to serialize payload cache entry")?;
        atomic_write(&path, &serialized)?;
        debug!(entry = %path.display(), bytes = serialized.len(), "payload cache entry written");
        Ok(entry)
    }
}

/// Lock path guarding a cache entry.
pub fn lock_path_for(entry_path: &Path) -> PathBuf {
    let mut name = entry_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(LOCK_SUFFIX);
    entry_path.with_file_name(name)
}

fn entry_file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn read_entry(path: &Path) -> Result<CacheEntry, PayloadError> {
    let data = fs::read(path)?;
    serde_json::from_slice(&data).map_err(|err| PayloadError::CacheEntryCorrupt {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}
