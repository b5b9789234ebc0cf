//! Entrypoint metadata extraction.
//!
//! Closed-world entrypoints may declare a top-level `METADATA = "..."`
//! string containing a YAML mapping. The mapping selects a schema version
//! and, for version 1, a serialization profile. Entrypoints without the
//! declaration run with the legacy profile.

use rustpython_parser::ast;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PROFILE;
use crate::core::PayloadError;
use crate::pysrc::ParsedModule;

/// Declared (or defaulted) metadata for a task entrypoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub schema_version: u32,
    pub serialization_profile: String,
}

impl TaskMetadata {
    /// Metadata assumed for entrypoints with no `METADATA` declaration.
    pub fn legacy_default() -> Self {
        Self {
            schema_version: 1,
            serialization_profile: DEFAULT_PROFILE.to_string(),
        }
    }
}

impl Default for TaskMetadata {
    fn default() -> Self {
        Self::legacy_default()
    }
}

/// Fields accepted by schema version 1.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaV1 {
    serialization_profile: String,
}

/// Locate and validate the module's `METADATA` declaration.
pub fn extract_metadata(module: &ParsedModule) -> Result<TaskMetadata, PayloadError> {
    let mut declarations = Vec::new();
    for stmt in module.body() {
        let ast::Stmt::Assign(assign) = stmt else {
            continue;
        };
        let [target] = assign.targets.as_slice() else {
            continue;
        };
        let ast::Expr::Name(name) = target else {
            continue;
        };
        if name.id.as_str() == "METADATA" {
            declarations.push(assign);
        }
    }

    let declaration = match declarations.as_slice() {
        [] => return Ok(TaskMetadata::legacy_default()),
        [declaration] => declaration,
        _ => {
            return Err(invalid("METADATA must be defined only once"));
        }
    };

    let ast::Expr::Constant(constant) = declaration.value.as_ref() else {
        return Err(invalid("METADATA must be a string constant"));
    };
    let ast::Constant::Str(text) = &constant.value else {
        return Err(invalid("METADATA must be a string constant"));
    };

    let parsed: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|err| invalid(format!("METADATA must be valid YAML: {err}")))?;
    let serde_yaml::Value::Mapping(mut mapping) = parsed else {
        return Err(invalid("METADATA must be a YAML mapping"));
    };

    let version = mapping
        .remove("schema_version")
        .ok_or_else(|| invalid("METADATA schema_version is unknown"))?;
    match &version {
        serde_yaml::Value::Number(number) if number.as_u64() == Some(1) => {}
        other => {
            return Err(invalid(format!(
                "METADATA schema_version {} is unknown",
                describe_yaml(other)
            )));
        }
    }

    let fields: SchemaV1 = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
        .map_err(|err| invalid(format!("METADATA is invalid: {err}")))?;

    Ok(TaskMetadata {
        schema_version: 1,
        serialization_profile: fields.serialization_profile,
    })
}

fn invalid(reason: impl Into<String>) -> PayloadError {
    PayloadError::InvalidMetadata {
        reason: reason.into(),
    }
}

fn describe_yaml(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Number(number) => number.to_string(),
        serde_yaml::Value::String(text) => format!("{text:?}"),
        other => format!("{other:?}"),
    }
}
