//! Pack discovery and runtime routing metadata.
//!
//! Packs may ship a `meta/runtime.yml` that redirects, deprecates, or
//! tombstones support units under their namespace. The resolver consults
//! this table before (packs) or after (core) looking for physical files,
//! so renamed units keep working and removed ones fail with a clear
//! message.
//!
//! Two seams are defined as traits so tests can substitute fixed data:
//! [`PackLocationProvider`] answers "where is this pack installed" and
//! [`RoutingProvider`] answers "what does this identity's routing table
//! say".

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::constants::{BUILTIN_ROUTING_IDENTITY, PACK_NAMESPACE_ROOT, PACK_RUNTIME_METADATA};

/// Parsed pack runtime metadata (`meta/runtime.yml`). Keys other than
/// `unit_routing` are permitted and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeMetadata {
    #[serde(default)]
    pub unit_routing: UnitRouting,
}

/// Routing tables keyed by plugin type. Only support units are routed
/// here; other plugin types are outside the builder's concern.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitRouting {
    #[serde(default)]
    pub task_utils: HashMap<String, RoutingEntry>,
}

/// Routing directives for a single unit name within a pack. A tombstone
/// wins over a redirect; a deprecation may accompany either.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingEntry {
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub deprecation: Option<RoutingNotice>,
    #[serde(default)]
    pub tombstone: Option<RoutingNotice>,
}

/// Removal details attached to a deprecation or tombstone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingNotice {
    #[serde(default)]
    pub removal_version: Option<String>,
    #[serde(default)]
    pub removal_date: Option<String>,
    #[serde(default)]
    pub warning_text: Option<String>,
}

impl RuntimeMetadata {
    /// Routing entry for a support unit name relative to the pack root.
    pub fn unit_entry(&self, remainder: &str) -> Option<&RoutingEntry> {
        self.unit_routing.task_utils.get(remainder)
    }
}

impl RoutingNotice {
    /// Human-readable removal detail for warnings and error messages.
    pub fn describe(&self) -> String {
        let mut detail = match (&self.removal_version, &self.removal_date) {
            (Some(version), _) => format!("removed in version {version}"),
            (None, Some(date)) => format!("removed after {date}"),
            (None, None) => "removed".to_string(),
        };
        if let Some(text) = &self.warning_text {
            detail.push_str(&format!(" ({text})"));
        }
        detail
    }
}

/// Resolves a pack's installed location on the control host.
pub trait PackLocationProvider: Send + Sync {
    /// Install directory for `<namespace>.<name>`, or `None` when the pack
    /// is not installed anywhere on the search path.
    fn locate_pack(&self, namespace: &str, name: &str) -> Option<PathBuf>;
}

/// Searches a list of root directories for installed packs. Each root is
/// expected to contain a `bosun_packs/<namespace>/<name>` tree; the first
/// root holding the requested pack wins.
#[derive(Debug, Clone)]
pub struct DirPackLocations {
    roots: Vec<PathBuf>,
}

impl DirPackLocations {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl PackLocationProvider for DirPackLocations {
    fn locate_pack(&self, namespace: &str, name: &str) -> Option<PathBuf> {
        for root in &self.roots {
            let candidate = root.join(PACK_NAMESPACE_ROOT).join(namespace).join(name);
            if candidate.is_dir() {
                trace!(
                    pack = format!("{namespace}.{name}"),
                    path = %candidate.display(),
                    "located pack install directory"
                );
                return Some(candidate);
            }
        }
        None
    }
}

impl<T: PackLocationProvider + ?Sized> PackLocationProvider for Arc<T> {
    fn locate_pack(&self, namespace: &str, name: &str) -> Option<PathBuf> {
        (**self).locate_pack(namespace, name)
    }
}

/// Supplies routing tables by identity: `<namespace>.<name>` for packs,
/// or the builtin identity for the core namespace.
pub trait RoutingProvider: Send + Sync {
    /// `Ok(None)` means the identity has no routing table. `Err` means a
    /// table exists but could not be loaded; callers decide whether that
    /// is fatal.
    fn routing_for(&self, identity: &str) -> Result<Option<RuntimeMetadata>>;
}

/// Loads routing tables from `meta/runtime.yml` files under installed
/// packs, with an optional standalone table for the builtin identity.
/// Successful loads are cached per identity.
pub struct MetaRuntimeProvider<L> {
    locations: L,
    builtin_table: Option<PathBuf>,
    cache: Mutex<HashMap<String, Option<RuntimeMetadata>>>,
}

impl<L: PackLocationProvider> MetaRuntimeProvider<L> {
    pub fn new(locations: L, builtin_table: Option<PathBuf>) -> Self {
        Self {
            locations,
            builtin_table,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn load(&self, identity: &str) -> Result<Option<RuntimeMetadata>> {
        let path = if identity == BUILTIN_ROUTING_IDENTITY {
            match &self.builtin_table {
                Some(path) => path.clone(),
                None => return Ok(None),
            }
        } else {
            let Some((namespace, name)) = identity.split_once('.') else {
                return Ok(None);
            };
            let Some(install_dir) = self.locations.locate_pack(namespace, name) else {
                return Ok(None);
            };
            install_dir.join(PACK_RUNTIME_METADATA)
        };

        if !path.is_file() {
            return Ok(None);
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read routing metadata at {}", path.display()))?;
        let metadata: RuntimeMetadata = serde_yaml::from_str(&text)
            .with_context(|| format!("invalid routing metadata at {}", path.display()))?;
        debug!(
            identity,
            path = %path.display(),
            entries = metadata.unit_routing.task_utils.len(),
            "loaded routing metadata"
        );
        Ok(Some(metadata))
    }
}

impl<L: PackLocationProvider> RoutingProvider for MetaRuntimeProvider<L> {
    fn routing_for(&self, identity: &str) -> Result<Option<RuntimeMetadata>> {
        {
            let cache = self
                .cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.get(identity) {
                return Ok(cached.clone());
            }
        }

        let loaded = self.load(identity)?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.to_string(), loaded.clone());
        Ok(loaded)
    }
}

/// In-memory routing tables, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRoutingProvider {
    tables: HashMap<String, RuntimeMetadata>,
}

impl StaticRoutingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, identity: impl Into<String>, table: RuntimeMetadata) -> Self {
        self.tables.insert(identity.into(), table);
        self
    }
}

impl RoutingProvider for StaticRoutingProvider {
    fn routing_for(&self, identity: &str) -> Result<Option<RuntimeMetadata>> {
        Ok(self.tables.get(identity).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_routing_table() {
        let text = concat!(
            "requires_bosun: '>=2.0'\n",
            "unit_routing:\n",
            "  task_utils:\n",
            "    old_name:\n",
            "      redirect: acme.tools.new_name\n",
            "    gone:\n",
            "      tombstone:\n",
            "        removal_version: '3.0'\n",
            "        warning_text: use new_name instead\n",
            "    aging:\n",
            "      deprecation:\n",
            "        removal_date: '2027-01-01'\n",
            "      redirect: acme.tools.fresh\n",
        );
        let metadata: RuntimeMetadata = serde_yaml::from_str(text).unwrap();

        let old = metadata.unit_entry("old_name").unwrap();
        assert_eq!(old.redirect.as_deref(), Some("acme.tools.new_name"));
        assert!(old.tombstone.is_none());

        let gone = metadata.unit_entry("gone").unwrap();
        let tombstone = gone.tombstone.as_ref().unwrap();
        assert_eq!(tombstone.removal_version.as_deref(), Some("3.0"));

        let aging = metadata.unit_entry("aging").unwrap();
        assert!(aging.deprecation.is_some());
        assert_eq!(aging.redirect.as_deref(), Some("acme.tools.fresh"));

        assert!(metadata.unit_entry("missing").is_none());
    }

    #[test]
    fn empty_metadata_has_no_entries() {
        let metadata: RuntimeMetadata = serde_yaml::from_str("{}").unwrap();
        assert!(metadata.unit_entry("anything").is_none());
    }

    #[test]
    fn notice_descriptions_prefer_versions() {
        let notice = RoutingNotice {
            removal_version: Some("3.0".to_string()),
            removal_date: Some("2027-01-01".to_string()),
            warning_text: Some("use the new unit".to_string()),
        };
        assert_eq!(
            notice.describe(),
            "removed in version 3.0 (use the new unit)"
        );

        let bare = RoutingNotice::default();
        assert_eq!(bare.describe(), "removed");
    }

    #[test]
    fn dir_locations_search_roots_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let pack_dir = second.path().join("bosun_packs/acme/tools");
        std::fs::create_dir_all(&pack_dir).unwrap();

        let locations =
            DirPackLocations::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(locations.locate_pack("acme", "tools"), Some(pack_dir));
        assert_eq!(locations.locate_pack("acme", "other"), None);
    }

    #[test]
    fn meta_runtime_provider_reads_pack_tables() {
        let root = tempfile::tempdir().unwrap();
        let pack_dir = root.path().join("bosun_packs/acme/tools");
        std::fs::create_dir_all(pack_dir.join("meta")).unwrap();
        std::fs::write(
            pack_dir.join("meta/runtime.yml"),
            "unit_routing:\n  task_utils:\n    old:\n      redirect: acme.tools.new\n",
        )
        .unwrap();

        let provider = MetaRuntimeProvider::new(
            DirPackLocations::new(vec![root.path().to_path_buf()]),
            None,
        );
        let table = provider.routing_for("acme.tools").unwrap().unwrap();
        assert_eq!(
            table.unit_entry("old").unwrap().redirect.as_deref(),
            Some("acme.tools.new")
        );

        // Cached result for repeat lookups.
        assert!(provider.routing_for("acme.tools").unwrap().is_some());
        // Packs without metadata resolve to no table.
        assert!(provider.routing_for("acme.bare").unwrap().is_none());
    }

    #[test]
    fn malformed_tables_are_load_errors() {
        let root = tempfile::tempdir().unwrap();
        let pack_dir = root.path().join("bosun_packs/acme/tools");
        std::fs::create_dir_all(pack_dir.join("meta")).unwrap();
        std::fs::write(pack_dir.join("meta/runtime.yml"), "unit_routing: [not, a, map]\n")
            .unwrap();

        let provider = MetaRuntimeProvider::new(
            DirPackLocations::new(vec![root.path().to_path_buf()]),
            None,
        );
        assert!(provider.routing_for("acme.tools").is_err());
    }

    #[test]
    fn builtin_identity_uses_the_standalone_table() {
        let dir = tempfile::tempdir().unwrap();
        let table_path = dir.path().join("builtin_routing.yml");
        std::fs::write(
            &table_path,
            "unit_routing:\n  task_utils:\n    legacy_net:\n      redirect: acme.net.client\n",
        )
        .unwrap();

        let provider = MetaRuntimeProvider::new(
            DirPackLocations::new(Vec::new()),
            Some(table_path),
        );
        let table = provider
            .routing_for(BUILTIN_ROUTING_IDENTITY)
            .unwrap()
            .unwrap();
        assert!(table.unit_entry("legacy_net").is_some());

        let without = MetaRuntimeProvider::new(DirPackLocations::new(Vec::new()), None);
        assert!(without.routing_for(BUILTIN_ROUTING_IDENTITY).unwrap().is_none());
    }
}
