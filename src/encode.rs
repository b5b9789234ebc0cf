//! Serialization profiles and argument encoding.
//!
//! A task's serialization profile (declared through its metadata, defaulting
//! to `legacy`) names the codec units bundled into the payload and the
//! encoder used to serialize task arguments into the wrapper. Control-host
//! and remote-side codecs must agree, so both are derived from the same
//! profile name.

use serde_json::Value;

use crate::constants::{CODEC_UNIT_PREFIX, DEFAULT_PROFILE, TAGGED_PROFILE, TASK_ARGS_KEY};
use crate::core::PayloadError;
use crate::name::UnitName;

/// Profiles this build knows how to encode for.
pub const SUPPORTED_PROFILES: [&str; 2] = [DEFAULT_PROFILE, TAGGED_PROFILE];

/// Which half of the remote exchange a codec unit handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Control host to remote: task arguments.
    Request,
    /// Remote to control host: task results.
    Response,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

fn ensure_supported(profile: &str) -> Result<(), PayloadError> {
    if SUPPORTED_PROFILES.contains(&profile) {
        Ok(())
    } else {
        Err(PayloadError::UnsupportedProfile {
            profile: profile.to_string(),
        })
    }
}

/// Codec unit bundled for one direction of the given profile.
pub fn codec_unit(profile: &str, direction: Direction) -> Result<UnitName, PayloadError> {
    ensure_supported(profile)?;
    Ok(UnitName::from_dotted(&format!(
        "{CODEC_UNIT_PREFIX}._{profile}_{}",
        direction.as_str()
    )))
}

/// Serializes the wrapper's parameter object for transport.
pub trait ArgumentEncoder: Send + Sync {
    /// Profile the encoder implements.
    fn profile(&self) -> &str;

    /// Encode `params` to the text embedded in the wrapper. `task` names
    /// the task being built, for error reporting.
    fn encode(&self, task: &str, params: &Value) -> Result<String, PayloadError>;
}

/// JSON argument encoding. Both built-in profiles serialize arguments as
/// plain JSON on the control host; they differ in the codec pair bundled
/// for the remote side.
pub struct JsonArgumentEncoder {
    profile: &'static str,
}

impl ArgumentEncoder for JsonArgumentEncoder {
    fn profile(&self) -> &str {
        self.profile
    }

    fn encode(&self, task: &str, params: &Value) -> Result<String, PayloadError> {
        serde_json::to_string(params).map_err(|err| PayloadError::ArgumentEncoding {
            task: task.to_string(),
            reason: err.to_string(),
        })
    }
}

/// Encoder implementing the named profile.
pub fn encoder_for_profile(profile: &str) -> Result<Box<dyn ArgumentEncoder>, PayloadError> {
    for supported in SUPPORTED_PROFILES {
        if supported == profile {
            return Ok(Box::new(JsonArgumentEncoder { profile: supported }));
        }
    }
    Err(PayloadError::UnsupportedProfile {
        profile: profile.to_string(),
    })
}

/// Wrap raw task arguments in the parameter object the bootstrap expects.
pub fn wrap_task_args(args: Value) -> Value {
    serde_json::json!({ TASK_ARGS_KEY: args })
}
