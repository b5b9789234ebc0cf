//! Builder configuration
//!
//! The builder reads its configuration from the process environment, with
//! programmatic overrides for embedding and tests:
//!
//! 1. `BOSUN_SUPPORT_PATH` - search path for the core support tree
//!    (path-list separated like `PATH`)
//! 2. `BOSUN_PACK_PATH` - roots searched for installed packs
//! 3. `BOSUN_CACHE_DIR` - payload cache location (defaults to the platform
//!    cache directory, e.g. `~/.cache/bosun/payload_cache` on Linux)
//! 4. `BOSUN_KEEP_DEBUG_FILES` - keep the bootstrap comments in composed
//!    payloads so exploded copies carry their usage instructions
//! 5. `BOSUN_TASK_COMPRESSION` - container compression (`stored` or
//!    `deflated`)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::archive::Compression;
use crate::constants::PAYLOAD_CACHE_DIR;

/// Settings controlling one [`PayloadBuilder`](crate::builder::PayloadBuilder).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Directories searched for the core support tree.
    pub support_paths: Vec<PathBuf>,
    /// Roots searched for installed packs (`<root>/bosun_packs/<ns>/<pack>`).
    pub pack_paths: Vec<PathBuf>,
    /// Directory holding built payload cache entries.
    pub cache_dir: PathBuf,
    /// Keep bootstrap comments in composed payloads.
    pub keep_debug_files: bool,
    /// Compression applied to container entries.
    pub module_compression: Compression,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            support_paths: Vec::new(),
            pack_paths: Vec::new(),
            cache_dir: default_cache_dir(),
            keep_debug_files: false,
            module_compression: Compression::default(),
        }
    }
}

impl BuilderConfig {
    /// Configuration from the process environment.
    pub fn from_env() -> Self {
        let cache_dir = match std::env::var("BOSUN_CACHE_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_cache_dir(),
        };
        let module_compression = match std::env::var("BOSUN_TASK_COMPRESSION") {
            Ok(value) if !value.trim().is_empty() => Compression::parse_lossy(&value),
            _ => Compression::default(),
        };

        Self {
            support_paths: env_path_list("BOSUN_SUPPORT_PATH"),
            pack_paths: env_path_list("BOSUN_PACK_PATH"),
            cache_dir,
            keep_debug_files: env_flag("BOSUN_KEEP_DEBUG_FILES"),
            module_compression,
        }
    }

    /// Append a core support tree directory.
    #[must_use]
    pub fn with_support_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.support_paths.push(path.into());
        self
    }

    /// Append a pack root directory.
    #[must_use]
    pub fn with_pack_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pack_paths.push(path.into());
        self
    }

    /// Override the payload cache location.
    #[must_use]
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }

    /// Override the container compression.
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.module_compression = compression;
        self
    }

    /// Keep bootstrap comments in composed payloads.
    #[must_use]
    pub fn with_keep_debug_files(mut self, keep: bool) -> Self {
        self.keep_debug_files = keep;
        self
    }
}

/// Platform cache location for built payloads.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bosun")
        .join(PAYLOAD_CACHE_DIR)
}

fn env_path_list(name: &str) -> Vec<PathBuf> {
    match std::env::var_os(name) {
        Some(value) => std::env::split_paths(&value)
            .filter(|path| !path.as_os_str().is_empty())
            .collect(),
        None => Vec::new(),
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
