//! Entrypoint style classification.
//!
//! Every build starts by sniffing the entrypoint bytes to decide how much
//! work the rest of the pipeline owes it. Binary entrypoints pass through
//! untouched, closed-world Python entrypoints get the full dependency
//! closure and bootstrap wrapper, and the legacy styles only get argument
//! handling appropriate to their markers.
//!
//! Classification is purely textual: a 1 KiB control-byte sniff for
//! binaries, sentinel containment checks, and one regex over the import
//! forms that mark a closed-world module. Precedence is fixed: binary,
//! then the replacement sentinel, then closed-world imports, then the
//! JSON-args sentinel, then `WANT_JSON`, and finally the positional
//! fallback.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use regex::bytes::Regex;

use crate::constants::{JSON_ARGS_SENTINEL, REPLACER, REPLACER_IMPORT, WANT_JSON_SENTINEL};

/// How an entrypoint expects to receive support code and arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStyle {
    /// Compiled executable. Forwarded byte-for-byte.
    Binary,
    /// Python entrypoint importing the support namespaces. Gets the full
    /// payload treatment: dependency closure, container, bootstrap wrapper.
    ClosedWorld,
    /// Script carrying the JSON argument splice sentinel.
    LegacyJsonArgs,
    /// Non-Python script that reads a JSON arguments file (`WANT_JSON`).
    NonNativeJson,
    /// Plain script taking `key=value` arguments on its command line.
    LegacyPositional,
}

impl EntryStyle {
    /// Stable lowercase label used in logs and CLI output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::ClosedWorld => "closed-world",
            Self::LegacyJsonArgs => "legacy-json-args",
            Self::NonNativeJson => "non-native-json",
            Self::LegacyPositional => "legacy-positional",
        }
    }

    /// True for styles that receive no payload container, only argument and
    /// shebang handling.
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::LegacyJsonArgs | Self::NonNativeJson | Self::LegacyPositional)
    }
}

impl fmt::Display for EntryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify entrypoint bytes, substituting the replacement sentinel in place
/// when present.
///
/// Returns the detected style and the (possibly rewritten) entrypoint bytes.
/// Only a sentinel hit allocates; every other outcome borrows the input.
pub fn classify(data: &[u8]) -> (EntryStyle, Cow<'_, [u8]>) {
    if is_binary(data) {
        return (EntryStyle::Binary, Cow::Borrowed(data));
    }

    if contains_bytes(data, REPLACER) {
        let substituted = replace_all(data, REPLACER, REPLACER_IMPORT);
        return (EntryStyle::ClosedWorld, Cow::Owned(substituted));
    }

    if closed_world_regex().is_match(data) {
        return (EntryStyle::ClosedWorld, Cow::Borrowed(data));
    }

    if contains_bytes(data, JSON_ARGS_SENTINEL) {
        return (EntryStyle::LegacyJsonArgs, Cow::Borrowed(data));
    }

    if contains_bytes(data, WANT_JSON_SENTINEL) {
        return (EntryStyle::NonNativeJson, Cow::Borrowed(data));
    }

    (EntryStyle::LegacyPositional, Cow::Borrowed(data))
}

/// Import forms that mark a closed-world module: deep relative imports of
/// `task_utils`, absolute pack imports through `plugins.task_utils`, and
/// absolute core imports.
fn closed_world_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?:from +\.{2,} *task_utils.* +import |",
            r"from +bosun_packs\.[^.]+\.[^.]+\.plugins\.task_utils.* +import |",
            r"import +bosun_packs\.[^.]+\.[^.]+\.plugins\.task_utils.*|",
            r"from +bosun\.task_utils.* +import |",
            r"import +bosun\.task_utils\.)",
        ))
        .expect("classifier pattern is valid")
    })
}

/// Control bytes other than common text whitespace mark a binary. Only the
/// first 1 KiB is inspected.
fn is_binary(data: &[u8]) -> bool {
    let head = &data[..data.len().min(1024)];
    head.iter().any(|&b| !is_text_byte(b))
}

const fn is_text_byte(b: u8) -> bool {
    matches!(b, 7 | 8 | 9 | 10 | 12 | 13 | 27) || (b >= 0x20 && b != 0x7f)
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    find_bytes(haystack, needle).is_some()
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn replace_all(data: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut rest = data;
    while let Some(at) = find_bytes(rest, needle) {
        out.extend_from_slice(&rest[..at]);
        out.extend_from_slice(replacement);
        rest = &rest[at + needle.len()..];
    }
    out.extend_from_slice(rest);
    out
}
