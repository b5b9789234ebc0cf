//! File system helpers shared across the crate
//!
//! Small utilities for directory creation and atomic file publication. The
//! cache and the CLI both publish files with [`atomic_write`] so readers never
//! observe a partially written payload.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Create a directory and all of its parents if they do not exist.
///
/// # Examples
///
/// ```rust,no_run
/// use bosun_payload::utils::ensure_dir;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// ensure_dir(Path::new("cache/payloads"))?;
/// # Ok(())
/// # }
/// ```
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// The content is written to a temporary sibling file, synced to disk, and
/// renamed over the target path. Readers either see the old content or the
/// complete new content, never a partial write.
///
/// The temporary name is formed by appending `.tmp` to the full file name
/// rather than replacing the extension; cache entry names contain dots, and
/// replacing the extension would collapse distinct entries onto one
/// temporary path.
///
/// # Arguments
///
/// * `path` - The target file path
/// * `content` - The raw bytes to write
///
/// # Examples
///
/// ```rust,no_run
/// use bosun_payload::utils::atomic_write;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// atomic_write(Path::new("cache/bosun.tasks.ping-stored"), b"{}")?;
/// # Ok(())
/// # }
/// ```
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = temp_sibling(path);

    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path).with_context(|| {
        format!("Failed to move {} into place at {}", temp_path.display(), path.display())
    })?;

    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
