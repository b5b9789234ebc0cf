//! Command-line interface for the payload builder.
//!
//! Two subcommands cover the pipeline: `build` runs the whole thing for one
//! task and writes the shippable payload, while `classify` stops after style
//! detection and reports what the pipeline would do with the file.
//!
//! Global `--verbose` and `--quiet` flags select the log level. `RUST_LOG`
//! overrides both when set, and all logging goes to stderr so a payload
//! written to stdout stays clean.
//!
//! # Examples
//!
//! ```bash
//! # Build a payload and write it next to the task file
//! bosun-payload build tasks/ping.py --output ping.payload
//!
//! # Feed arguments and host variables in as JSON
//! bosun-payload build tasks/ping.py \
//!     --args '{"state": "present"}' \
//!     --task-vars '{"bosun_python_interpreter": "/usr/bin/python3"}'
//!
//! # See how a file would be treated without building anything
//! bosun-payload classify tasks/ping.py
//! ```

mod build;
mod classify;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

pub use build::BuildCommand;
pub use classify::ClassifyCommand;

/// Top-level argument structure.
#[derive(Parser)]
#[command(
    name = "bosun-payload",
    about = "Builds self-contained remote execution payloads for Bosun tasks",
    version,
    author
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress everything except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Build the payload for one task entrypoint.
    Build(BuildCommand),

    /// Classify an entrypoint and report its build treatment.
    Classify(ClassifyCommand),
}

impl Cli {
    /// Initializes logging per the verbosity flags, then runs the selected
    /// subcommand.
    pub fn execute(self) -> Result<()> {
        self.init_logging();
        match self.command {
            Commands::Build(cmd) => cmd.execute(),
            Commands::Classify(cmd) => cmd.execute(),
        }
    }

    fn init_logging(&self) {
        let fallback = if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
