//! Remote execution payload builder for Bosun tasks.
//!
//! This crate turns a task entrypoint file into a self-contained payload the
//! control host can copy to a remote machine and run with nothing but a
//! Python interpreter. It is both a library and the `bosun-payload` CLI.
//!
//! # Pipeline
//!
//! A build runs through five stages:
//!
//! 1. **Classification** ([`style`]) sniffs the entrypoint bytes and decides
//!    its treatment: closed-world Python modules get the full pipeline,
//!    legacy scripts get argument and shebang handling only, and binaries
//!    pass through untouched.
//! 2. **Resolution** ([`resolver`]) walks the entrypoint's imports to the
//!    full closure of support units, consulting routing tables for
//!    redirects, deprecations, and tombstones.
//! 3. **Assembly** ([`archive`]) writes the closure into a deterministic
//!    zip container: same inputs, same bytes.
//! 4. **Composition** ([`compose`]) renders the self-extracting wrapper
//!    script carrying the container, the encoded arguments, and the
//!    interpreter shebang.
//! 5. **Caching** ([`cache`]) keeps finished containers on disk, keyed by
//!    task name and compression, with advisory file locks so concurrent
//!    workers build each payload exactly once.
//!
//! [`builder::PayloadBuilder`] drives the stages end to end.
//!
//! # Example
//!
//! ```rust,no_run
//! use bosun_payload::builder::{BuildRequest, PayloadBuilder};
//! use bosun_payload::config::BuilderConfig;
//! use serde_json::json;
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! let builder = PayloadBuilder::new(BuilderConfig::from_env());
//! let built = builder.build(&BuildRequest {
//!     task_name: "ping".to_string(),
//!     module_path: PathBuf::from("tasks/ping.py"),
//!     args: json!({ "state": "present" }),
//!     task_vars: json!({}),
//! })?;
//! assert!(!built.data.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! # Module Map
//!
//! Pipeline stages:
//! - [`style`] - Entrypoint style classification
//! - [`resolver`] - Dependency closure resolution
//! - [`archive`] - Deterministic zip container assembly
//! - [`compose`] - Bootstrap wrapper composition
//! - [`cache`] - Payload cache with advisory locking
//! - [`builder`] - End-to-end build orchestration
//!
//! Support:
//! - [`name`] - Dotted unit names and their archive paths
//! - [`pysrc`] - Python source parsing, import scanning, metadata extraction
//! - [`routing`] - Pack locations and redirect tables
//! - [`encode`] - Argument encoding profiles
//! - [`interp`] - Remote interpreter selection
//! - [`config`] - Builder configuration and environment overrides
//! - [`cli`] - Command-line interface
//! - [`core`] - Error types and user-facing error contexts
//! - [`constants`] - Shared namespace and sentinel constants
//! - [`utils`] - Directory and atomic write helpers

// Pipeline stages
pub mod archive;
pub mod builder;
pub mod cache;
pub mod compose;
pub mod resolver;
pub mod style;

// Support modules
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod encode;
pub mod interp;
pub mod name;
pub mod pysrc;
pub mod routing;
pub mod utils;
