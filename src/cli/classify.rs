//! Report how an entrypoint would be built.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::style::classify;

/// Classifies an entrypoint and prints the detected style without building
/// anything. The label matches what `build` logs for the same file.
#[derive(Args)]
pub struct ClassifyCommand {
    /// Task entrypoint file.
    module_path: PathBuf,
}

impl ClassifyCommand {
    pub fn execute(self) -> Result<()> {
        let data = fs::read(&self.module_path)
            .with_context(|| format!("failed to read task file {}", self.module_path.display()))?;
        let (style, _) = classify(&data);
        println!("{style}");
        Ok(())
    }
}
