//! Core types and functionality for bosun-payload
//!
//! This module forms the foundation of the crate's type system. It currently
//! holds the error handling infrastructure used by every other module.
//!
//! # Error Management
//!
//! The builder uses a two-layer error system designed for both developer
//! ergonomics and end-user experience:
//! - **Strongly-typed errors** ([`PayloadError`]) for precise error handling
//!   in code
//! - **User-friendly contexts** ([`ErrorContext`]) with actionable suggestions
//!   for CLI users
//! - **Automatic error conversion** from common standard library errors
//!
//! # Examples
//!
//! ```rust
//! use bosun_payload::core::{PayloadError, user_friendly_error};
//!
//! fn example_operation() -> anyhow::Result<String> {
//!     Err(PayloadError::UnsupportedProfile { profile: "cbor".into() }.into())
//! }
//!
//! match example_operation() {
//!     Ok(result) => println!("Success: {result}"),
//!     Err(e) => user_friendly_error(e).display(),
//! }
//! ```

pub mod error;

pub use error::{ErrorContext, PayloadError, user_friendly_error};
