//! Interpreter selection for composed payloads.
//!
//! The remote interpreter is taken from the entrypoint's shebang, then
//! overridden through task vars. Python hints go through interpreter
//! discovery: an `auto` setting without a discovered fact is a distinct,
//! catchable condition so the orchestrator can gather facts and retry.

use serde_json::Value;

use crate::core::PayloadError;

/// Settings that defer the Python interpreter choice to host discovery.
const DISCOVERY_MODES: [&str; 4] = ["auto", "auto_legacy", "auto_silent", "auto_legacy_silent"];

/// Concrete interpreter choice for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInterpreter {
    /// Full shebang line, `#!` included, with arguments appended.
    pub shebang: String,
    /// Interpreter path the shebang points at.
    pub interpreter: String,
}

/// Resolves an interpreter hint against task vars and host facts.
pub trait InterpreterResolver: Send + Sync {
    fn resolve(
        &self,
        hint: &str,
        args: &[String],
        task_vars: &Value,
    ) -> Result<ResolvedInterpreter, PayloadError>;
}

/// Default resolver backed by `bosun_<name>_interpreter` task vars and
/// gathered host facts.
pub struct FactsInterpreterResolver;

impl InterpreterResolver for FactsInterpreterResolver {
    fn resolve(
        &self,
        hint: &str,
        args: &[String],
        task_vars: &Value,
    ) -> Result<ResolvedInterpreter, PayloadError> {
        let name = interpreter_name(hint);
        let interpreter_var = format!("bosun_{name}_interpreter");

        let mut resolved: Option<String> = None;

        // Only plain `python` goes through discovery; everything else
        // relies on a matching var.
        if name == "python" {
            let configured = task_vars
                .get(&interpreter_var)
                .and_then(Value::as_str)
                .unwrap_or("auto")
                .trim();

            if configured.is_empty() || DISCOVERY_MODES.contains(&configured) {
                let discovered = task_vars
                    .get("bosun_facts")
                    .and_then(|facts| facts.get("discovered_interpreter_python"))
                    .and_then(Value::as_str);
                match discovered {
                    Some(path) => resolved = Some(path.to_string()),
                    None => {
                        return Err(PayloadError::InterpreterDiscoveryRequired {
                            interpreter: name.to_string(),
                            mode: configured.to_string(),
                        });
                    }
                }
            } else {
                resolved = Some(configured.to_string());
            }
        } else if let Some(value) = task_vars.get(&interpreter_var).and_then(Value::as_str) {
            let value = value.trim();
            if !value.is_empty() {
                resolved = Some(value.to_string());
            }
        }

        let interpreter = resolved.unwrap_or_else(|| hint.to_string());

        let mut shebang = format!("#!{interpreter}");
        if !args.is_empty() {
            shebang.push(' ');
            shebang.push_str(&args.join(" "));
        }

        Ok(ResolvedInterpreter {
            shebang,
            interpreter,
        })
    }
}

fn interpreter_name(hint: &str) -> &str {
    hint.rsplit('/').next().unwrap_or(hint).trim()
}

/// Splits the shebang off the first line of module data.
///
/// Returns the interpreter and its arguments, or `None` when the data does
/// not start with `#!`.
pub fn extract_interpreter(data: &[u8]) -> Option<(String, Vec<String>)> {
    let first_line = data.split(|&b| b == b'\n').next()?;
    let text = String::from_utf8_lossy(first_line);
    let rest = text.trim().strip_prefix("#!")?;

    let mut parts = rest.split_whitespace();
    let interpreter = parts.next()?.to_string();
    let args = parts.map(str::to_string).collect();
    Some((interpreter, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve(hint: &str, args: &[&str], task_vars: Value) -> Result<ResolvedInterpreter, PayloadError> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        FactsInterpreterResolver.resolve(hint, &args, &task_vars)
    }

    #[test]
    fn explicit_python_var_wins() {
        let vars = json!({"bosun_python_interpreter": "/opt/py/bin/python3"});
        let resolved = resolve("/usr/bin/python", &[], vars).unwrap();
        assert_eq!(resolved.interpreter, "/opt/py/bin/python3");
        assert_eq!(resolved.shebang, "#!/opt/py/bin/python3");
    }

    #[test]
    fn auto_uses_the_discovered_fact() {
        let vars = json!({
            "bosun_python_interpreter": "auto",
            "bosun_facts": {"discovered_interpreter_python": "/usr/bin/python3.12"}
        });
        let resolved = resolve("python", &[], vars).unwrap();
        assert_eq!(resolved.interpreter, "/usr/bin/python3.12");
    }

    #[test]
    fn auto_without_a_fact_requires_discovery() {
        let err = resolve("/usr/bin/python", &[], json!({})).unwrap_err();
        match err {
            PayloadError::InterpreterDiscoveryRequired { interpreter, mode } => {
                assert_eq!(interpreter, "python");
                assert_eq!(mode, "auto");
            }
            other => panic!("expected InterpreterDiscoveryRequired, got {other:?}"),
        }
    }

    #[test]
    fn silent_auto_modes_also_require_discovery() {
        let vars = json!({"bosun_python_interpreter": "auto_legacy_silent"});
        let err = resolve("python", &[], vars).unwrap_err();
        match err {
            PayloadError::InterpreterDiscoveryRequired { mode, .. } => {
                assert_eq!(mode, "auto_legacy_silent");
            }
            other => panic!("expected InterpreterDiscoveryRequired, got {other:?}"),
        }
    }

    #[test]
    fn non_python_hints_consult_their_own_var() {
        let vars = json!({"bosun_perl_interpreter": "/opt/perl/bin/perl"});
        let resolved = resolve("/usr/bin/perl", &[], vars).unwrap();
        assert_eq!(resolved.interpreter, "/opt/perl/bin/perl");

        let resolved = resolve("/usr/bin/perl", &[], json!({})).unwrap();
        assert_eq!(resolved.interpreter, "/usr/bin/perl");
    }

    #[test]
    fn versioned_python_skips_discovery() {
        let resolved = resolve("/usr/bin/python3", &[], json!({})).unwrap();
        assert_eq!(resolved.interpreter, "/usr/bin/python3");

        let vars = json!({"bosun_python3_interpreter": "/usr/local/bin/python3"});
        let resolved = resolve("/usr/bin/python3", &[], vars).unwrap();
        assert_eq!(resolved.interpreter, "/usr/local/bin/python3");
    }

    #[test]
    fn shebang_arguments_are_appended() {
        let vars = json!({"bosun_python_interpreter": "/usr/bin/python3"});
        let resolved = resolve("python", &["-E", "-s"], vars).unwrap();
        assert_eq!(resolved.shebang, "#!/usr/bin/python3 -E -s");
    }

    #[test]
    fn extracts_shebang_with_arguments() {
        let (interpreter, args) = extract_interpreter(b"#!/usr/bin/python3 -E\nprint()\n").unwrap();
        assert_eq!(interpreter, "/usr/bin/python3");
        assert_eq!(args, ["-E"]);
    }

    #[test]
    fn missing_shebang_yields_none() {
        assert!(extract_interpreter(b"import os\n").is_none());
        assert!(extract_interpreter(b"").is_none());
        assert!(extract_interpreter(b"#!").is_none());
    }
}
