//! Error handling for bosun-payload
//!
//! This module provides the error types and user-friendly error reporting for
//! the payload builder. The error system is designed around two core
//! principles:
//! 1. **Strongly-typed errors** for precise error handling in code
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! The error system consists of two main types:
//! - [`PayloadError`] - Enumerated error types for all failure cases in the
//!   build pipeline
//! - [`ErrorContext`] - Wrapper that adds user-friendly messages and
//!   suggestions
//!
//! # Error Categories
//!
//! - **Source analysis**: [`PayloadError::ModuleParse`],
//!   [`PayloadError::InvalidMetadata`]
//! - **Dependency resolution**: [`PayloadError::UnresolvedDependency`],
//!   [`PayloadError::RedirectTombstone`], [`PayloadError::RoutingError`]
//! - **Assembly and composition**: [`PayloadError::PreZipEpoch`],
//!   [`PayloadError::UnsupportedProfile`], [`PayloadError::ArgumentEncoding`]
//! - **Interpreter selection**: [`PayloadError::InterpreterDiscoveryRequired`]
//! - **Cache protocol**: [`PayloadError::PeerBuildFailure`],
//!   [`PayloadError::CacheEntryCorrupt`]
//!
//! # Error Conversion and Context
//!
//! Common standard library errors are automatically converted:
//! - [`std::io::Error`] → [`PayloadError::IoError`]
//! - [`serde_json::Error`] → [`PayloadError::JsonError`]
//!
//! Use [`user_friendly_error`] to convert any error into a user-friendly
//! format with contextual suggestions.
//!
//! # Examples
//!
//! ```rust,no_run
//! use bosun_payload::core::{PayloadError, user_friendly_error};
//!
//! fn build() -> anyhow::Result<()> {
//!     Err(PayloadError::UnsupportedProfile { profile: "cbor".into() }.into())
//! }
//!
//! if let Err(error) = build() {
//!     user_friendly_error(error).display();
//! }
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for payload build operations.
///
/// Each variant represents a specific failure mode and carries the details a
/// caller needs to react: unit names for resolution failures, cache entry
/// names for lock protocol failures, reasons for parse and validation
/// failures.
#[derive(Error, Debug)]
pub enum PayloadError {
    /// Python source could not be parsed into a syntax tree.
    #[error("failed to parse Python source for '{unit}': {reason}")]
    ModuleParse {
        /// Unit whose source failed to parse
        unit: String,
        /// Parser diagnostic
        reason: String,
    },

    /// The entrypoint's `METADATA` declaration is malformed.
    #[error("invalid task metadata: {reason}")]
    InvalidMetadata {
        /// What was wrong with the declaration
        reason: String,
    },

    /// A required import reference could not be located anywhere.
    #[error("could not find imported support code for '{unit}'. Looked for ({candidates})")]
    UnresolvedDependency {
        /// Entrypoint whose closure was being resolved
        unit: String,
        /// Comma-separated candidate names that were tried
        candidates: String,
    },

    /// A required import resolves to a unit removed via a tombstone entry.
    #[error("support unit '{unit}' has been removed: {reason}")]
    RedirectTombstone {
        /// The removed unit
        unit: String,
        /// Removal notice text, with version or date when declared
        reason: String,
    },

    /// A pack routing table failed to load or contains an invalid entry.
    #[error("routing metadata for pack '{pack}' is unusable: {reason}")]
    RoutingError {
        /// Pack identity (`<ns>.<pack>`)
        pack: String,
        /// Load or validation failure
        reason: String,
    },

    /// Task arguments could not be encoded for transport.
    #[error("failed to encode arguments for task '{task}': {reason}")]
    ArgumentEncoding {
        /// Task being built
        task: String,
        /// Encoder diagnostic
        reason: String,
    },

    /// The metadata names a serialization profile this build does not know.
    #[error("unsupported serialization profile '{profile}'")]
    UnsupportedProfile {
        /// The unknown profile name
        profile: String,
    },

    /// A peer process acquired the build lock first but never published the
    /// cache entry.
    #[error("a different worker failed to create the payload for '{entry}'")]
    PeerBuildFailure {
        /// Cache entry file name
        entry: String,
    },

    /// A published cache entry exists but could not be decoded.
    #[error("cached payload at '{path}' is corrupt: {reason}")]
    CacheEntryCorrupt {
        /// Path of the unreadable entry
        path: String,
        /// Decode failure
        reason: String,
    },

    /// The interpreter setting requires discovery output that is not present.
    #[error("interpreter discovery required: '{interpreter}' is set to '{mode}'")]
    InterpreterDiscoveryRequired {
        /// Interpreter name from the shebang
        interpreter: String,
        /// The discovery mode that was configured
        mode: String,
    },

    /// The system clock reports a time before the container format epoch.
    #[error("cannot store payload timestamps earlier than 1980-01-01 (clock reports {timestamp})")]
    PreZipEpoch {
        /// The offending timestamp
        timestamp: String,
    },

    /// General file system operation failure.
    #[error("file system error during {operation}: {path}")]
    FileSystemError {
        /// Operation that failed
        operation: String,
        /// Path involved
        path: String,
    },

    /// Standard I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Other error.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl Clone for PayloadError {
    fn clone(&self) -> Self {
        match self {
            Self::ModuleParse { unit, reason } => Self::ModuleParse {
                unit: unit.clone(),
                reason: reason.clone(),
            },
            Self::InvalidMetadata { reason } => Self::InvalidMetadata {
                reason: reason.clone(),
            },
            Self::UnresolvedDependency { unit, candidates } => Self::UnresolvedDependency {
                unit: unit.clone(),
                candidates: candidates.clone(),
            },
            Self::RedirectTombstone { unit, reason } => Self::RedirectTombstone {
                unit: unit.clone(),
                reason: reason.clone(),
            },
            Self::RoutingError { pack, reason } => Self::RoutingError {
                pack: pack.clone(),
                reason: reason.clone(),
            },
            Self::ArgumentEncoding { task, reason } => Self::ArgumentEncoding {
                task: task.clone(),
                reason: reason.clone(),
            },
            Self::UnsupportedProfile { profile } => Self::UnsupportedProfile {
                profile: profile.clone(),
            },
            Self::PeerBuildFailure { entry } => Self::PeerBuildFailure {
                entry: entry.clone(),
            },
            Self::CacheEntryCorrupt { path, reason } => Self::CacheEntryCorrupt {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::InterpreterDiscoveryRequired { interpreter, mode } => {
                Self::InterpreterDiscoveryRequired {
                    interpreter: interpreter.clone(),
                    mode: mode.clone(),
                }
            }
            Self::PreZipEpoch { timestamp } => Self::PreZipEpoch {
                timestamp: timestamp.clone(),
            },
            Self::FileSystemError { operation, path } => Self::FileSystemError {
                operation: operation.clone(),
                path: path.clone(),
            },
            // For errors that don't implement Clone, convert to Other
            Self::IoError(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::JsonError(e) => Self::Other {
                message: format!("JSON error: {e}"),
            },
            Self::Other { message } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Contextual error information with user-friendly messaging.
///
/// Wraps a [`PayloadError`] with an optional suggestion for resolution and
/// optional additional details. This is the primary way build failures are
/// presented to CLI users.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying payload error
    pub error: PayloadError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from a [`PayloadError`].
    #[must_use]
    pub const fn new(error: PayloadError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    ///
    /// Error message in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Convert any error to a user-friendly [`ErrorContext`] with suggestions.
///
/// Recognizes [`PayloadError`] variants and common I/O failures and attaches
/// tailored suggestions; everything else passes through with its message
/// intact.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(payload_error) = error.downcast_ref::<PayloadError>() {
        return create_error_context(payload_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(PayloadError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion(
                    "Check file ownership, or point BOSUN_CACHE_DIR at a writable directory",
                )
                .with_details(
                    "The builder needs read access to support trees and write access to the payload cache",
                );
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(PayloadError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct")
                .with_details("A required file or directory cannot be found");
            }
            _ => {}
        }
    }

    ErrorContext::new(PayloadError::Other {
        message: format!("{error:#}"),
    })
}

fn create_error_context(error: PayloadError) -> ErrorContext {
    match &error {
        PayloadError::ModuleParse { unit, .. } => {
            let unit = unit.clone();
            ErrorContext::new(error).with_suggestion(format!(
                "Check '{unit}' for syntax errors, e.g. with 'python -m py_compile'"
            ))
        }

        PayloadError::InvalidMetadata { .. } => ErrorContext::new(error)
            .with_suggestion(
                "Declare METADATA exactly once, as a top-level string constant holding a YAML mapping",
            )
            .with_details(
                "The mapping needs a supported schema_version and the fields that version defines",
            ),

        PayloadError::UnresolvedDependency { .. } => ErrorContext::new(error)
            .with_suggestion(
                "Check the import spelling, the configured support paths, and that the owning pack is installed",
            )
            .with_details(
                "Imports are resolved statically against the core support tree and installed pack trees",
            ),

        PayloadError::RedirectTombstone { .. } => ErrorContext::new(error)
            .with_suggestion("Update the entrypoint to stop importing the removed unit"),

        PayloadError::RoutingError { pack, .. } => {
            let pack = pack.clone();
            ErrorContext::new(error).with_suggestion(format!(
                "Validate the meta/runtime.yml shipped by '{pack}'; redirect targets must be fully qualified"
            ))
        }

        PayloadError::UnsupportedProfile { .. } => ErrorContext::new(error)
            .with_suggestion("Supported serialization profiles: legacy, tagged"),

        PayloadError::PeerBuildFailure { .. } => ErrorContext::new(error)
            .with_suggestion("Retry the build; if it persists, clear the payload cache directory")
            .with_details(
                "Another process acquired the build lock for this payload but exited before publishing it",
            ),

        PayloadError::CacheEntryCorrupt { .. } => {
            ErrorContext::new(error).with_suggestion("Delete the cached file and rebuild")
        }

        PayloadError::InterpreterDiscoveryRequired { .. } => ErrorContext::new(error)
            .with_suggestion(
                "Run interpreter discovery for the target host first, or pin an explicit interpreter path in the task vars",
            ),

        PayloadError::PreZipEpoch { .. } => {
            ErrorContext::new(error).with_suggestion("Correct the system clock and rebuild")
        }

        _ => ErrorContext::new(error),
    }
}
