//! Bootstrap wrapper composition.
//!
//! The final payload is the embedded bootstrap preamble followed by a
//! `_bootstrap_main(...)` call carrying the encoded container and the
//! per-invocation parameters as Python literals. The preamble ships
//! comment-stripped to cut over-the-wire size; builds keeping debug files
//! use the raw text so the usage instructions survive on the remote host.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Timelike, Utc};

const BOOTSTRAP_TEMPLATE: &str = include_str!("bootstrap.py");
const SHEBANG_PLACEHOLDER: &str = "# shebang placeholder";

/// Per-invocation parameters appended to the bootstrap call.
pub struct WrapperParams<'a> {
    pub container_b64: &'a str,
    pub task_name: &'a str,
    pub task_fqn: &'a str,
    pub encoded_params: &'a str,
    pub profile: &'a str,
    pub shebang: &'a str,
    pub date_time: DateTime<Utc>,
    pub coverage_config: Option<&'a str>,
    pub coverage_output: Option<&'a str>,
    pub rlimit_nofile: i64,
}

/// Compose the self-executing wrapper for one build.
pub fn compose(params: &WrapperParams<'_>, keep_comments: bool) -> String {
    let template = if keep_comments {
        BOOTSTRAP_TEMPLATE
    } else {
        stripped_template()
    };
    let code = template.replace(SHEBANG_PLACEHOLDER, params.shebang);

    let args = [
        ("container", PyLiteral::Str(params.container_b64)),
        ("task_name", PyLiteral::Str(params.task_name)),
        ("task_fqn", PyLiteral::Str(params.task_fqn)),
        ("params", PyLiteral::Str(params.encoded_params)),
        ("profile", PyLiteral::Str(params.profile)),
        ("date_time", PyLiteral::DateTime(params.date_time)),
        ("coverage_config", optional_str(params.coverage_config)),
        ("coverage_output", optional_str(params.coverage_output)),
        ("rlimit_nofile", PyLiteral::Int(params.rlimit_nofile)),
    ];
    let args_string = args
        .iter()
        .map(|(key, value)| format!("{key}={value},"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{code}\n\nif __name__ == \"__main__\":\n    _bootstrap_main(\n{args_string}\n)\n")
}

/// The comment-stripped preamble, computed once per process.
fn stripped_template() -> &'static str {
    static STRIPPED: OnceLock<String> = OnceLock::new();
    STRIPPED.get_or_init(|| strip_comments(BOOTSTRAP_TEMPLATE))
}

/// Blank out comment and empty lines, keeping the shebang placeholder and
/// the overall line count so tracebacks still point at the right lines.
fn strip_comments(source: &str) -> String {
    source
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if (trimmed.is_empty() || trimmed.starts_with('#')) && trimmed != SHEBANG_PLACEHOLDER {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn optional_str(value: Option<&str>) -> PyLiteral<'_> {
    match value {
        Some(text) => PyLiteral::Str(text),
        None => PyLiteral::None,
    }
}

/// Values the wrapper call site can carry, rendered as Python literals.
enum PyLiteral<'a> {
    Str(&'a str),
    None,
    Int(i64),
    DateTime(DateTime<Utc>),
}

impl fmt::Display for PyLiteral<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write_str_literal(f, value),
            Self::DateTime(value) => write_datetime_literal(f, value),
        }
    }
}

fn write_str_literal(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("'")?;
    for ch in value.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            ch if (ch as u32) < 0x20 => write!(f, "\\x{:02x}", ch as u32)?,
            ch => write!(f, "{ch}")?,
        }
    }
    f.write_str("'")
}

/// Matches CPython's datetime repr: seconds appear only when the second or
/// microsecond is non-zero, microseconds only when non-zero.
fn write_datetime_literal(f: &mut fmt::Formatter<'_>, value: &DateTime<Utc>) -> fmt::Result {
    write!(
        f,
        "datetime.datetime({}, {}, {}, {}, {}",
        value.year(),
        value.month(),
        value.day(),
        value.hour(),
        value.minute()
    )?;
    let second = value.second();
    let micro = value.timestamp_subsec_micros();
    if second != 0 || micro != 0 {
        write!(f, ", {second}")?;
    }
    if micro != 0 {
        write!(f, ", {micro}")?;
    }
    f.write_str(", tzinfo=datetime.timezone.utc)")
}
