//! Global constants used throughout the bosun-payload codebase.
//!
//! Namespace roots, embedded sentinels, and seed unit names live here so the
//! classifier, resolver, and composer agree on them without cross-module
//! string duplication.

/// Segments of the core support namespace (`bosun.task_utils`).
pub const CORE_NAMESPACE: [&str; 2] = ["bosun", "task_utils"];

/// Root segment of the extension pack namespace.
pub const PACK_NAMESPACE_ROOT: &str = "bosun_packs";

/// Fixed segments between a pack identity and its support units
/// (`bosun_packs.<ns>.<pack>.plugins.task_utils`).
pub const PACK_PLUGIN_PATH: [&str; 2] = ["plugins", "task_utils"];

/// Minimum segment count for a pack unit that maps to a physical file.
/// Anything shorter names package scaffolding along the fixed plugin path.
pub const PACK_UNIT_MIN_SEGMENTS: usize = 6;

/// Routing identity used when consulting redirect tables for the core tree.
pub const BUILTIN_ROUTING_IDENTITY: &str = "bosun.builtin";

/// Unit that bundled third-party compatibility shims collapse to. Imports of
/// anything underneath it resolve to the package itself.
pub const COMPAT_UNIT: [&str; 3] = ["bosun", "task_utils", "compat"];

/// Bootstrap support unit required by every closed-world payload.
pub const BOOTSTRAP_UNIT: &str = "bosun.task_utils._internal._bootstrap";

/// Base task API unit required by every closed-world payload.
pub const BASIC_UNIT: &str = "bosun.task_utils.basic";

/// Package holding the per-profile codec units seeded into every payload.
pub const CODEC_UNIT_PREFIX: &str = "bosun.task_utils._internal._codecs";

/// Replacement sentinel for the legacy snippet-substitution style. A line
/// containing this marker is rewritten to a star import of [`BASIC_UNIT`].
pub const REPLACER: &[u8] = b"#<<BOSUN_TASK_COMMON>>";

/// Import line substituted for [`REPLACER`].
pub const REPLACER_IMPORT: &[u8] = b"from bosun.task_utils.basic import *";

/// Sentinel marking entrypoints that expect arguments spliced in as JSON text.
pub const JSON_ARGS_SENTINEL: &[u8] = b"<<BOSUN_TASK_JSON_ARGS>>";

/// Sentinel marking non-Python entrypoints that read a JSON arguments file.
pub const WANT_JSON_SENTINEL: &[u8] = b"WANT_JSON";

/// Key under which task arguments are nested in the encoded parameter object.
pub const TASK_ARGS_KEY: &str = "BOSUN_TASK_ARGS";

/// Interpreter assumed when an entrypoint carries no shebang.
pub const DEFAULT_INTERPRETER: &str = "/usr/bin/python3";

/// Fallback namespace for entrypoints whose on-disk location matches neither
/// the core tree nor an installed pack.
pub const LEGACY_ENTRY_NAMESPACE: &str = "bosun.legacy";

/// Suffix appended to a cache entry path to form its advisory lock file.
pub const LOCK_SUFFIX: &str = ".lock";

/// Directory under the user cache dir that holds built payload containers.
pub const PAYLOAD_CACHE_DIR: &str = "payload_cache";

/// Relative path of a pack's routing metadata document.
pub const PACK_RUNTIME_METADATA: &str = "meta/runtime.yml";

/// Routing table for the builtin identity, relative to each support path.
pub const CORE_ROUTING_TABLE: &str = "routing.yml";

/// Serialization profile assumed when an entrypoint declares no metadata.
pub const DEFAULT_PROFILE: &str = "legacy";

/// Serialization profile carrying type tags alongside plain JSON values.
pub const TAGGED_PROFILE: &str = "tagged";

/// Task variable holding the `RLIMIT_NOFILE` soft limit applied before a
/// Python entrypoint runs. Zero leaves the inherited limit alone.
pub const RLIMIT_NOFILE_VAR: &str = "bosun_python_task_rlimit_nofile";

/// Environment variable naming a coverage configuration file. When set,
/// wrappers instrument the remote run.
pub const COVERAGE_CONFIG_ENV: &str = "_BOSUN_COVERAGE_CONFIG";

/// Environment variable naming the remote coverage output path. Required
/// whenever [`COVERAGE_CONFIG_ENV`] is set.
pub const COVERAGE_OUTPUT_ENV: &str = "_BOSUN_COVERAGE_OUTPUT";
