//! Build the payload for one task entrypoint.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use crate::archive::Compression;
use crate::builder::{BuildRequest, PayloadBuilder};
use crate::config::BuilderConfig;

/// Runs the full pipeline for one entrypoint and writes the shippable
/// payload to `--output` or stdout.
///
/// Configuration starts from the environment (`BOSUN_SUPPORT_PATH`,
/// `BOSUN_PACK_PATH`, `BOSUN_CACHE_DIR`, `BOSUN_KEEP_DEBUG_FILES`,
/// `BOSUN_TASK_COMPRESSION`); individual flags layer on top of it.
#[derive(Args)]
pub struct BuildCommand {
    /// Task entrypoint file.
    module_path: PathBuf,

    /// Task name; defaults to the file stem.
    #[arg(long)]
    task_name: Option<String>,

    /// Task arguments as a JSON document.
    #[arg(long, default_value = "{}")]
    args: String,

    /// Host and task variables as a JSON document.
    #[arg(long, default_value = "{}")]
    task_vars: String,

    /// Directory holding core support units. Repeatable.
    #[arg(long = "support-path", value_name = "DIR")]
    support_paths: Vec<PathBuf>,

    /// Directory holding installed packs. Repeatable.
    #[arg(long = "pack-path", value_name = "DIR")]
    pack_paths: Vec<PathBuf>,

    /// Payload cache directory.
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Container compression: "stored" or "deflated".
    #[arg(long)]
    compression: Option<String>,

    /// Keep wrapper comments for on-host debugging.
    #[arg(long)]
    keep_debug_files: bool,

    /// Write the payload here instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl BuildCommand {
    pub fn execute(self) -> Result<()> {
        let config = self.builder_config();
        let task_name = self.resolve_task_name()?;
        let args: Value =
            serde_json::from_str(&self.args).context("--args must be a JSON document")?;
        let task_vars: Value =
            serde_json::from_str(&self.task_vars).context("--task-vars must be a JSON document")?;

        let builder = PayloadBuilder::new(config);
        let built = builder.build(&BuildRequest {
            task_name,
            module_path: self.module_path.clone(),
            args,
            task_vars,
        })?;

        match &self.output {
            Some(path) => {
                fs::write(path, &built.data)
                    .with_context(|| format!("failed to write payload to {}", path.display()))?;
                println!(
                    "Built {} payload ({} bytes) at {}",
                    built.style,
                    built.data.len(),
                    path.display()
                );
            }
            None => {
                std::io::stdout()
                    .write_all(&built.data)
                    .context("failed to write payload to stdout")?;
            }
        }
        Ok(())
    }

    /// Environment configuration with flag overrides layered on top.
    pub(crate) fn builder_config(&self) -> BuilderConfig {
        let mut config = BuilderConfig::from_env();
        for path in &self.support_paths {
            config = config.with_support_path(path);
        }
        for path in &self.pack_paths {
            config = config.with_pack_path(path);
        }
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir);
        }
        if let Some(compression) = &self.compression {
            config = config.with_compression(Compression::parse_lossy(compression));
        }
        if self.keep_debug_files {
            config = config.with_keep_debug_files(true);
        }
        config
    }

    fn resolve_task_name(&self) -> Result<String> {
        if let Some(name) = &self.task_name {
            return Ok(name.clone());
        }
        self.module_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .with_context(|| {
                format!(
                    "cannot derive a task name from {}, pass --task-name",
                    self.module_path.display()
                )
            })
    }
}
