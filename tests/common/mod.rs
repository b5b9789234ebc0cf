//! Common fixtures for payload builder integration tests.
//!
//! [`TestWorkspace`] lays out everything a build needs inside one temp
//! directory: a core support tree, a pack search root, a payload cache, and
//! places to put task files.

// Allow dead code because these utilities are shared across test files and
// not every test file uses all of them
#![allow(dead_code)]

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use bosun_payload::archive::Compression;
use bosun_payload::cache::CacheEntry;
use bosun_payload::config::BuilderConfig;

/// Scratch directory with the standard payload build layout.
pub struct TestWorkspace {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    /// Creates the layout and seeds the core support units every payload
    /// needs.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();
        let workspace = Self {
            _temp_dir: temp_dir,
            root,
        };
        fs::create_dir_all(workspace.support_path())?;
        fs::create_dir_all(workspace.pack_path())?;
        fs::create_dir_all(workspace.cache_path())?;
        workspace.write_core_support_tree()?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory whose contents map to `bosun.task_utils`.
    pub fn support_path(&self) -> PathBuf {
        self.root.join("support")
    }

    /// Search root containing `bosun_packs/`.
    pub fn pack_path(&self) -> PathBuf {
        self.root.join("packs")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.root.join("cache")
    }

    fn write_core_support_tree(&self) -> Result<()> {
        let support = self.support_path();
        fs::write(
            support.join("basic.py"),
            "def run_task(spec):\n    return spec\n",
        )?;
        fs::create_dir_all(support.join("_internal/_codecs"))?;
        fs::write(support.join("_internal/__init__.py"), "")?;
        fs::write(
            support.join("_internal/_bootstrap.py"),
            "def _bootstrap_main(**kwargs):\n    pass\n",
        )?;
        fs::write(support.join("_internal/_codecs/__init__.py"), "")?;
        fs::write(
            support.join("_internal/_codecs/_legacy_request.py"),
            "decode = None\n",
        )?;
        fs::write(
            support.join("_internal/_codecs/_legacy_response.py"),
            "encode = None\n",
        )?;
        Ok(())
    }

    /// Adds a unit under the core support tree.
    pub fn write_support_unit(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.support_path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Writes a task under a `bosun/tasks` tree so its canonical name is
    /// `bosun.tasks.<name>`. Returns the file path.
    pub fn write_core_task(&self, name: &str, content: &str) -> Result<PathBuf> {
        let tasks = self.root.join("repo/bosun/tasks");
        fs::create_dir_all(&tasks)?;
        let path = tasks.join(format!("{name}.py"));
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Writes a task file outside any recognized tree.
    pub fn write_loose_task(&self, file_name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.root.join(file_name);
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Installs an empty pack skeleton and returns its directory.
    pub fn install_pack(&self, namespace: &str, name: &str) -> Result<PathBuf> {
        let pack = self
            .pack_path()
            .join("bosun_packs")
            .join(namespace)
            .join(name);
        fs::create_dir_all(pack.join("plugins/task_utils"))?;
        fs::create_dir_all(pack.join("plugins/tasks"))?;
        fs::create_dir_all(pack.join("meta"))?;
        Ok(pack)
    }

    /// Configuration pointing at this workspace, with stored compression so
    /// container bytes are easy to inspect.
    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig::default()
            .with_support_path(self.support_path())
            .with_pack_path(self.pack_path())
            .with_cache_dir(self.cache_path())
            .with_compression(Compression::Stored)
    }

    /// Reads a cache entry and decodes its container bytes.
    pub fn cached_container(&self, task_fqn: &str, compression: &str) -> Result<Vec<u8>> {
        let entry_path = self.cache_path().join(format!("{task_fqn}-{compression}"));
        let entry: CacheEntry = serde_json::from_slice(&fs::read(entry_path)?)?;
        Ok(STANDARD.decode(&entry.container_b64)?)
    }
}

/// Task variables pinning the Python interpreter, bypassing discovery.
pub fn python_task_vars() -> serde_json::Value {
    serde_json::json!({ "bosun_python_interpreter": "/usr/bin/python3" })
}

/// Pulls a string-literal argument out of a composed wrapper.
pub fn wrapper_field<'a>(wrapper: &'a str, key: &str) -> Option<&'a str> {
    wrapper.lines().find_map(|line| {
        line.strip_prefix(key)?
            .strip_prefix("='")?
            .strip_suffix("',")
    })
}

/// Entry names of a zip container, in write order.
pub fn container_entries(container: &[u8]) -> Result<Vec<String>> {
    let archive = zip::ZipArchive::new(std::io::Cursor::new(container.to_vec()))?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Reads one file out of a zip container.
pub fn container_file(container: &[u8], name: &str) -> Result<String> {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(container.to_vec()))?;
    let mut file = archive.by_name(name)?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(text)
}
