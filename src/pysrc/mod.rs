//! Python source analysis.
//!
//! The builder never executes task code on the control host. Everything it
//! learns about an entrypoint or support unit comes from parsing the source
//! into a syntax tree and walking it: import references for the dependency
//! closure ([`scan`]) and the optional `METADATA` declaration
//! ([`metadata`]).
//!
//! [`ParsedModule`] wraps the parser so the rest of the crate deals in
//! statement lists and typed errors instead of parser internals.

pub mod metadata;
pub mod scan;

pub use metadata::{TaskMetadata, extract_metadata};
pub use scan::{ImportRef, scan_imports};

use rustpython_parser::{Mode, ast, parse};

use crate::core::PayloadError;

/// A Python module parsed to its top-level statement list.
#[derive(Debug)]
pub struct ParsedModule {
    name: String,
    body: Vec<ast::Stmt>,
}

impl ParsedModule {
    /// Parse module source. `name` is the dotted unit name used in
    /// diagnostics.
    pub fn parse(name: &str, source: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(source).map_err(|err| PayloadError::ModuleParse {
            unit: name.to_string(),
            reason: format!("source is not valid UTF-8: {err}"),
        })?;

        let parsed = parse(text, Mode::Module, name).map_err(|err| PayloadError::ModuleParse {
            unit: name.to_string(),
            reason: err.to_string(),
        })?;

        let ast::Mod::Module(module) = parsed else {
            return Err(PayloadError::ModuleParse {
                unit: name.to_string(),
                reason: "source did not parse as a module".to_string(),
            });
        };

        Ok(Self {
            name: name.to_string(),
            body: module.body,
        })
    }

    /// Dotted name the module was parsed under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level statements.
    pub fn body(&self) -> &[ast::Stmt] {
        &self.body
    }
}
