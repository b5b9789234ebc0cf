//! Build orchestration.
//!
//! [`PayloadBuilder`] drives the whole pipeline for one entrypoint: classify
//! the source, and for closed-world Python entrypoints resolve the support
//! closure, assemble (or fetch from cache) the payload container, and compose
//! the self-extracting wrapper. Legacy styles only get interpreter handling,
//! and binaries pass through untouched.
//!
//! Containers are cached per task name and compression setting; wrappers are
//! composed fresh on every build because they embed the encoded arguments
//! and the build timestamp.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::archive;
use crate::cache::{CacheEntry, PayloadCache};
use crate::compose::{WrapperParams, compose};
use crate::config::BuilderConfig;
use crate::constants::{
    CORE_ROUTING_TABLE, COVERAGE_CONFIG_ENV, COVERAGE_OUTPUT_ENV, DEFAULT_INTERPRETER,
    DEFAULT_PROFILE, LEGACY_ENTRY_NAMESPACE, RLIMIT_NOFILE_VAR,
};
use crate::core::PayloadError;
use crate::encode::{encoder_for_profile, wrap_task_args};
use crate::interp::{FactsInterpreterResolver, InterpreterResolver, extract_interpreter};
use crate::name::UnitName;
use crate::resolver::DependencyResolver;
use crate::routing::{DirPackLocations, MetaRuntimeProvider, PackLocationProvider, RoutingProvider};
use crate::style::{EntryStyle, classify};

/// One task to build a payload for.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Short task name as invoked.
    pub task_name: String,
    /// On-disk location of the entrypoint file.
    pub module_path: PathBuf,
    /// Raw task arguments, nested under the argument key before encoding.
    pub args: Value,
    /// Host and task variables consulted for interpreter selection and
    /// resource limits.
    pub task_vars: Value,
}

/// Finished build output, ready to ship to the remote host.
#[derive(Debug)]
pub struct BuiltTask {
    /// Bytes to transfer: the composed wrapper for closed-world entrypoints,
    /// the (possibly shebang-rewritten) original otherwise.
    pub data: Vec<u8>,
    pub style: EntryStyle,
    /// Shebang line selected for the remote side, when one applies.
    pub shebang: Option<String>,
    /// Serialization profile the arguments were encoded with.
    pub serialization_profile: String,
}

/// Builds remote execution payloads against a fixed configuration.
pub struct PayloadBuilder {
    config: BuilderConfig,
    resolver: DependencyResolver,
    cache: PayloadCache,
    interpreter: Arc<dyn InterpreterResolver>,
}

impl PayloadBuilder {
    /// Wires a builder from its configuration: pack locations and routing
    /// tables feed the resolver, the cache lives under the configured
    /// directory, and interpreter selection reads host facts.
    pub fn new(config: BuilderConfig) -> Self {
        let locations: Arc<dyn PackLocationProvider> =
            Arc::new(DirPackLocations::new(config.pack_paths.clone()));
        let routing: Arc<dyn RoutingProvider> = Arc::new(MetaRuntimeProvider::new(
            Arc::clone(&locations),
            builtin_routing_table(&config.support_paths),
        ));
        let resolver = DependencyResolver::new(config.support_paths.clone(), locations, routing);
        let cache = PayloadCache::new(config.cache_dir.clone());
        Self {
            config,
            resolver,
            cache,
            interpreter: Arc::new(FactsInterpreterResolver),
        }
    }

    /// Replaces the interpreter resolver.
    #[must_use]
    pub fn with_interpreter_resolver(mut self, interpreter: Arc<dyn InterpreterResolver>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Builds the payload for one task.
    ///
    /// The entrypoint file is read and classified, then handed to the
    /// pipeline its style asks for. Errors carry the typed
    /// [`PayloadError`] underneath so callers can match on the cause.
    pub fn build(&self, request: &BuildRequest) -> Result<BuiltTask> {
        let data = fs::read(&request.module_path).with_context(|| {
            format!("failed to read task file {}", request.module_path.display())
        })?;
        let (style, source) = classify(&data);
        debug!(task = request.task_name, style = %style, "classified entrypoint");

        match style {
            EntryStyle::Binary => Ok(BuiltTask {
                data: source.into_owned(),
                style,
                shebang: None,
                serialization_profile: DEFAULT_PROFILE.to_string(),
            }),
            EntryStyle::ClosedWorld => self.build_closed_world(request, &source),
            EntryStyle::LegacyJsonArgs
            | EntryStyle::NonNativeJson
            | EntryStyle::LegacyPositional => {
                self.rewrite_legacy(request, style, source.into_owned())
            }
        }
    }

    /// Full treatment: dependency closure, cached container, wrapper.
    fn build_closed_world(&self, request: &BuildRequest, source: &[u8]) -> Result<BuiltTask> {
        let entry_name = derive_entry_name(&request.task_name, &request.module_path);
        let task_fqn = entry_name.dotted();

        let date_time = Utc::now();
        archive::container_timestamp(&date_time)?;

        let compression = self.config.module_compression;
        let entry = self.cache.get_or_build(&task_fqn, compression, || {
            let resolution = self.resolver.resolve(&entry_name, source)?;
            let container = archive::assemble(
                &resolution.units,
                &entry_name,
                source,
                compression,
                &date_time,
            )?;
            Ok(CacheEntry {
                container_b64: STANDARD.encode(&container),
                metadata: resolution.metadata,
            })
        })?;

        let encoder = encoder_for_profile(&entry.metadata.serialization_profile)?;
        let params = wrap_task_args(request.args.clone());
        let encoded_params = encoder.encode(&request.task_name, &params)?;

        let (hint, args) = extract_interpreter(source)
            .unwrap_or_else(|| (DEFAULT_INTERPRETER.to_string(), Vec::new()));
        let resolved = self.interpreter.resolve(&hint, &args, &request.task_vars)?;

        let coverage_config = std::env::var(COVERAGE_CONFIG_ENV).ok();
        let coverage_output = coverage_output(coverage_config.is_some())?;

        let wrapper = compose(
            &WrapperParams {
                container_b64: &entry.container_b64,
                task_name: &request.task_name,
                task_fqn: &task_fqn,
                encoded_params: &encoded_params,
                profile: &entry.metadata.serialization_profile,
                shebang: &resolved.shebang,
                date_time,
                coverage_config: coverage_config.as_deref(),
                coverage_output: coverage_output.as_deref(),
                rlimit_nofile: rlimit_nofile(&request.task_vars),
            },
            self.config.keep_debug_files,
        );
        debug!(
            task = request.task_name,
            fqn = task_fqn,
            profile = entry.metadata.serialization_profile,
            "composed payload wrapper"
        );

        Ok(BuiltTask {
            data: wrapper.into_bytes(),
            style: EntryStyle::ClosedWorld,
            shebang: Some(resolved.shebang),
            serialization_profile: entry.metadata.serialization_profile,
        })
    }

    /// Legacy entrypoints keep their own argument handling; the only build
    /// step they need is pointing the shebang at the selected interpreter.
    fn rewrite_legacy(
        &self,
        request: &BuildRequest,
        style: EntryStyle,
        mut data: Vec<u8>,
    ) -> Result<BuiltTask> {
        let mut shebang = None;
        if let Some((interpreter, args)) = extract_interpreter(&data) {
            let resolved = self
                .interpreter
                .resolve(&interpreter, &args, &request.task_vars)?;
            if resolved.interpreter != interpreter {
                data = replace_first_line(&data, resolved.shebang.as_bytes());
            }
            shebang = Some(resolved.shebang);
        }
        Ok(BuiltTask {
            data,
            style,
            shebang,
            serialization_profile: DEFAULT_PROFILE.to_string(),
        })
    }
}

/// Canonical entry name for a task file. Files inside the core tree or an
/// installed pack keep their real namespace; anything else lands in the
/// legacy namespace so remote tracebacks still name the task.
fn derive_entry_name(task_name: &str, module_path: &Path) -> UnitName {
    let path = module_path.to_string_lossy().replace('\\', "/");
    let captured = core_entry_regex()
        .captures(&path)
        .or_else(|| pack_entry_regex().captures(&path))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());
    match captured {
        // A dot inside the captured path would corrupt the dotted name.
        Some(namespaced) if !namespaced.contains('.') => {
            UnitName::from_dotted(&namespaced.replace('/', "."))
        }
        _ => {
            debug!(
                task = task_name,
                path = %module_path.display(),
                "task file is outside the support trees, using the legacy namespace"
            );
            UnitName::from_dotted(&format!("{LEGACY_ENTRY_NAMESPACE}.{task_name}"))
        }
    }
}

fn core_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/(bosun/tasks/.*)\.py$").expect("core entry pattern is valid")
    })
}

fn pack_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/(bosun_packs/[^/]+/[^/]+/plugins/tasks/.*)\.py$")
            .expect("pack entry pattern is valid")
    })
}

/// First support path carrying a builtin routing table, if any.
fn builtin_routing_table(support_paths: &[PathBuf]) -> Option<PathBuf> {
    support_paths
        .iter()
        .map(|root| root.join(CORE_ROUTING_TABLE))
        .find(|table| table.is_file())
}

/// Coverage collection needs both variables: the configuration that enables
/// it and an output location for the results.
fn coverage_output(coverage_enabled: bool) -> Result<Option<String>, PayloadError> {
    if !coverage_enabled {
        return Ok(None);
    }
    match std::env::var(COVERAGE_OUTPUT_ENV) {
        Ok(output) => Ok(Some(output)),
        Err(_) => Err(PayloadError::Other {
            message: format!("{COVERAGE_OUTPUT_ENV} must be set when {COVERAGE_CONFIG_ENV} is"),
        }),
    }
}

fn rlimit_nofile(task_vars: &Value) -> i64 {
    match task_vars.get(RLIMIT_NOFILE_VAR) {
        Some(Value::Number(limit)) => limit.as_i64().unwrap_or(0),
        Some(Value::String(limit)) => limit.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn replace_first_line(data: &[u8], line: &[u8]) -> Vec<u8> {
    let rest = match data.iter().position(|&b| b == b'\n') {
        Some(newline) => &data[newline..],
        None => &[][..],
    };
    let mut rewritten = Vec::with_capacity(line.len() + rest.len());
    rewritten.extend_from_slice(line);
    rewritten.extend_from_slice(rest);
    rewritten
}
