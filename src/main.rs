//! Payload builder CLI entry point.
//!
//! Parses command-line arguments, runs the selected subcommand, and renders
//! failures through the user-friendly error context before exiting nonzero.
//!
//! Available commands:
//! - `build` - Build the shippable payload for one task entrypoint
//! - `classify` - Report how an entrypoint would be treated

use anyhow::Result;
use bosun_payload::cli;
use bosun_payload::core::error::user_friendly_error;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute() {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
