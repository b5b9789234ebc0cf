//! Dependency resolution.
//!
//! Starting from an entrypoint's import references, the resolver walks a
//! worklist until the full closure of support units is in hand: scan the
//! source for references, locate each one through its namespace's locator,
//! scan what was found for further references, and carry every ancestor
//! package so the bundled tree is importable on the remote host.
//!
//! The worklist is an ordered set keyed by name, so resolution order (and
//! with it every log line and error message) is independent of source
//! iteration order. Ambiguous from-import references are tried exact-first
//! with a parent fallback; nested imports are optional and silently dropped
//! when nothing matches.

mod locate;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::constants::{BASIC_UNIT, BOOTSTRAP_UNIT, CORE_NAMESPACE, PACK_NAMESPACE_ROOT};
use crate::core::PayloadError;
use crate::encode::{Direction, codec_unit};
use crate::name::UnitName;
use crate::pysrc::{ImportRef, ParsedModule, TaskMetadata, extract_metadata, scan_imports};
use crate::routing::{PackLocationProvider, RoutingProvider};

use locate::{
    CoreLocator, LocatedUnit, Location, PackLocator, UnitLocator, malformed_pack_reference,
};

/// One entry on the resolution worklist.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct DependencyRequest {
    pub name: UnitName,
    /// From-import references are ambiguous: the final segment may name an
    /// attribute rather than a unit, so the parent is a fallback candidate.
    pub is_ambiguous: bool,
    /// A child of this package resolved through a redirect.
    pub child_redirected: bool,
    /// Failing to locate the unit is tolerated.
    pub is_optional: bool,
}

/// A unit selected into the payload.
#[derive(Debug, Clone)]
pub struct ResolvedUnit {
    pub source: Vec<u8>,
    /// File path inside the payload container.
    pub archive_path: String,
}

/// Complete dependency closure for one entrypoint.
#[derive(Debug)]
pub struct Resolution {
    /// Units keyed by canonical name; iteration order is the container
    /// write order.
    pub units: BTreeMap<UnitName, ResolvedUnit>,
    /// Metadata declared by (or defaulted for) the entrypoint.
    pub metadata: TaskMetadata,
}

/// Resolves entrypoint closures against a core support tree, installed
/// packs, and their routing tables.
pub struct DependencyResolver {
    support_paths: Vec<PathBuf>,
    pack_locations: Arc<dyn PackLocationProvider>,
    routing: Arc<dyn RoutingProvider>,
}

impl DependencyResolver {
    pub fn new(
        support_paths: Vec<PathBuf>,
        pack_locations: Arc<dyn PackLocationProvider>,
        routing: Arc<dyn RoutingProvider>,
    ) -> Self {
        Self {
            support_paths,
            pack_locations,
            routing,
        }
    }

    /// Resolve the closure for an entrypoint. `entry_source` is the
    /// classified (and, for snippet-style sources, already substituted)
    /// entrypoint text.
    pub fn resolve(
        &self,
        entry_name: &UnitName,
        entry_source: &[u8],
    ) -> Result<Resolution, PayloadError> {
        let module = ParsedModule::parse(&entry_name.dotted(), entry_source)?;
        let metadata = extract_metadata(&module)?;

        let mut units: BTreeMap<UnitName, ResolvedUnit> = BTreeMap::new();
        seed_namespace_packages(&mut units);

        let mut queue: BTreeSet<DependencyRequest> = BTreeSet::new();
        enqueue_references(
            &mut queue,
            &units,
            scan_imports(module.body(), entry_name, false),
        );
        for required in required_units(&metadata)? {
            queue.insert(DependencyRequest {
                name: required,
                is_ambiguous: false,
                child_redirected: false,
                is_optional: false,
            });
        }

        let core = CoreLocator {
            support_paths: &self.support_paths,
            routing: self.routing.as_ref(),
        };
        let pack = PackLocator {
            locations: self.pack_locations.as_ref(),
            routing: self.routing.as_ref(),
        };

        while let Some(request) = queue.pop_first() {
            if units.contains_key(&request.name) {
                continue;
            }

            let location = if request.name.starts_with(&CORE_NAMESPACE) {
                core.locate(&request)?
            } else if request.name.first() == PACK_NAMESPACE_ROOT {
                if malformed_pack_reference(&request.name) {
                    debug!(
                        unit = %request.name,
                        "ignoring reference outside the pack support subtree"
                    );
                    Location::NotFound {
                        candidates: vec![request.name.clone()],
                    }
                } else {
                    pack.locate(&request)?
                }
            } else {
                warn!(
                    unit = %request.name,
                    "scanner collected an import outside the support namespaces"
                );
                continue;
            };

            let located = match location {
                Location::Found(located) => located,
                Location::NotFound { candidates } => {
                    if request.is_optional {
                        debug!(
                            unit = %request.name,
                            "skipping optional support import that was not found"
                        );
                        continue;
                    }
                    let listed = candidates
                        .iter()
                        .map(|c| format!("'{c}'"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(PayloadError::UnresolvedDependency {
                        unit: entry_name.dotted(),
                        candidates: listed,
                    });
                }
            };

            // An ambiguous reference may canonicalize to a name that is
            // already resolved.
            if units.contains_key(&located.name) {
                continue;
            }

            let parsed = ParsedModule::parse(&located.name.dotted(), &located.source)?;
            enqueue_references(
                &mut queue,
                &units,
                scan_imports(parsed.body(), &located.name, located.is_package),
            );

            let archive_path = located.archive_path();
            let LocatedUnit {
                name,
                source,
                redirected,
                ..
            } = located;
            debug!(unit = %name, path = archive_path, "resolved support unit");
            units.insert(
                name.clone(),
                ResolvedUnit {
                    source,
                    archive_path,
                },
            );

            for ancestor in name.ancestors() {
                if units.contains_key(&ancestor) {
                    continue;
                }
                queue.insert(DependencyRequest {
                    name: ancestor,
                    is_ambiguous: false,
                    child_redirected: redirected,
                    is_optional: request.is_optional,
                });
            }
        }

        Ok(Resolution { units, metadata })
    }
}

/// Units every payload carries regardless of what the entrypoint imports.
fn required_units(metadata: &TaskMetadata) -> Result<Vec<UnitName>, PayloadError> {
    let profile = &metadata.serialization_profile;
    Ok(vec![
        UnitName::from_dotted(BOOTSTRAP_UNIT),
        UnitName::from_dotted(BASIC_UNIT),
        codec_unit(profile, Direction::Request)?,
        codec_unit(profile, Direction::Response)?,
    ])
}

/// Queue scanned references, deduplicated by name. A name imported both
/// nested and at top level counts as optional.
fn enqueue_references(
    queue: &mut BTreeSet<DependencyRequest>,
    units: &BTreeMap<UnitName, ResolvedUnit>,
    refs: Vec<ImportRef>,
) {
    let optional: HashSet<UnitName> = refs
        .iter()
        .filter(|r| r.nested)
        .map(|r| r.name.clone())
        .collect();
    let names: BTreeSet<UnitName> = refs.into_iter().map(|r| r.name).collect();
    for name in names {
        if units.contains_key(&name) {
            continue;
        }
        queue.insert(DependencyRequest {
            is_optional: optional.contains(&name),
            name,
            is_ambiguous: true,
            child_redirected: false,
        });
    }
}

/// Pre-seed the two namespace packages whose `__init__` content is fixed.
/// The root carries build provenance; both extend their search path so the
/// bundled tree coexists with any system-installed copy.
fn seed_namespace_packages(units: &mut BTreeMap<UnitName, ResolvedUnit>) {
    let root = UnitName::from_segments([CORE_NAMESPACE[0]]);
    let root_init = format!(
        "from pkgutil import extend_path\n__path__=extend_path(__path__,__name__)\n__version__=\"{}\"\n__author__=\"{}\"\n",
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_AUTHORS"),
    );
    units.insert(
        root.clone(),
        ResolvedUnit {
            source: root_init.into_bytes(),
            archive_path: format!("{}/__init__.py", root.archive_path()),
        },
    );

    let support = UnitName::from_segments(CORE_NAMESPACE);
    let support_init = "from pkgutil import extend_path\n__path__=extend_path(__path__,__name__)\n";
    units.insert(
        support.clone(),
        ResolvedUnit {
            source: support_init.as_bytes().to_vec(),
            archive_path: format!("{}/__init__.py", support.archive_path()),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BUILTIN_ROUTING_IDENTITY;
    use crate::routing::{
        DirPackLocations, MetaRuntimeProvider, RuntimeMetadata, StaticRoutingProvider,
    };
    use std::fs;
    use std::path::Path;

    /// Writes the support units every payload needs under `root`.
    fn write_core_tree(root: &Path) {
        fs::write(root.join("basic.py"), "def run_task(spec):\n    pass\n").unwrap();
        fs::create_dir_all(root.join("_internal/_codecs")).unwrap();
        fs::write(root.join("_internal/__init__.py"), "").unwrap();
        fs::write(
            root.join("_internal/_bootstrap.py"),
            "def _bootstrap_main(**kwargs):\n    pass\n",
        )
        .unwrap();
        fs::write(root.join("_internal/_codecs/__init__.py"), "").unwrap();
        fs::write(
            root.join("_internal/_codecs/_legacy_request.py"),
            "decode = None\n",
        )
        .unwrap();
        fs::write(
            root.join("_internal/_codecs/_legacy_response.py"),
            "encode = None\n",
        )
        .unwrap();
    }

    fn resolver_for(root: &Path) -> DependencyResolver {
        DependencyResolver::new(
            vec![root.to_path_buf()],
            Arc::new(DirPackLocations::new(Vec::new())),
            Arc::new(StaticRoutingProvider::new()),
        )
    }

    fn unit_names(resolution: &Resolution) -> Vec<String> {
        resolution.units.keys().map(UnitName::dotted).collect()
    }

    fn entry_name() -> UnitName {
        UnitName::from_dotted("bosun.tasks.sample")
    }

    #[test]
    fn minimal_entry_bundles_the_required_units() {
        let tree = tempfile::tempdir().unwrap();
        write_core_tree(tree.path());

        let resolution = resolver_for(tree.path())
            .resolve(&entry_name(), b"x = 1\n")
            .unwrap();

        assert_eq!(
            unit_names(&resolution),
            [
                "bosun",
                "bosun.task_utils",
                "bosun.task_utils._internal",
                "bosun.task_utils._internal._bootstrap",
                "bosun.task_utils._internal._codecs",
                "bosun.task_utils._internal._codecs._legacy_request",
                "bosun.task_utils._internal._codecs._legacy_response",
                "bosun.task_utils.basic",
            ]
        );
        assert_eq!(resolution.metadata.serialization_profile, "legacy");

        let root = &resolution.units[&UnitName::from_dotted("bosun")];
        let text = String::from_utf8(root.source.clone()).unwrap();
        assert!(text.contains("extend_path"));
        assert!(text.contains("__version__"));
        assert_eq!(root.archive_path, "bosun/__init__.py");
    }

    #[test]
    fn imports_pull_their_transitive_closure() {
        let tree = tempfile::tempdir().unwrap();
        write_core_tree(tree.path());
        fs::create_dir_all(tree.path().join("net")).unwrap();
        fs::write(tree.path().join("net/__init__.py"), "").unwrap();
        fs::write(
            tree.path().join("net/http.py"),
            "from bosun.task_utils.net import urls\n",
        )
        .unwrap();
        fs::write(tree.path().join("net/urls.py"), "SCHEMES = ['https']\n").unwrap();

        let resolution = resolver_for(tree.path())
            .resolve(&entry_name(), b"import bosun.task_utils.net.http\n")
            .unwrap();

        let names = unit_names(&resolution);
        assert!(names.contains(&"bosun.task_utils.net".to_string()));
        assert!(names.contains(&"bosun.task_utils.net.http".to_string()));
        assert!(names.contains(&"bosun.task_utils.net.urls".to_string()));
    }

    #[test]
    fn ambiguous_references_canonicalize_to_the_parent_unit() {
        let tree = tempfile::tempdir().unwrap();
        write_core_tree(tree.path());
        fs::write(tree.path().join("net.py"), "TIMEOUT = 5\n").unwrap();

        let resolution = resolver_for(tree.path())
            .resolve(&entry_name(), b"from bosun.task_utils.net import TIMEOUT\n")
            .unwrap();

        let names = unit_names(&resolution);
        assert!(names.contains(&"bosun.task_utils.net".to_string()));
        assert!(!names.iter().any(|n| n.ends_with("TIMEOUT")));
    }

    #[test]
    fn missing_required_imports_list_every_candidate() {
        let tree = tempfile::tempdir().unwrap();
        write_core_tree(tree.path());

        let err = resolver_for(tree.path())
            .resolve(&entry_name(), b"from bosun.task_utils.net import missing\n")
            .unwrap_err();

        match err {
            PayloadError::UnresolvedDependency { unit, candidates } => {
                assert_eq!(unit, "bosun.tasks.sample");
                assert!(candidates.contains("'bosun.task_utils.net.missing'"));
                assert!(candidates.contains("'bosun.task_utils.net'"));
            }
            other => panic!("expected UnresolvedDependency, got {other:?}"),
        }
    }

    #[test]
    fn missing_optional_imports_are_dropped() {
        let tree = tempfile::tempdir().unwrap();
        write_core_tree(tree.path());

        let source = concat!(
            "try:\n",
            "    import bosun.task_utils.exotic\n",
            "except ImportError:\n",
            "    pass\n",
        );
        let resolution = resolver_for(tree.path())
            .resolve(&entry_name(), source.as_bytes())
            .unwrap();
        assert!(!unit_names(&resolution).iter().any(|n| n.contains("exotic")));
    }

    #[test]
    fn nested_use_of_a_name_marks_it_optional_everywhere() {
        let tree = tempfile::tempdir().unwrap();
        write_core_tree(tree.path());

        // The same missing unit is imported at top level and nested; the
        // nested occurrence makes the whole reference optional.
        let source = concat!(
            "import bosun.task_utils.exotic\n",
            "def f():\n",
            "    import bosun.task_utils.exotic\n",
        );
        let resolution = resolver_for(tree.path())
            .resolve(&entry_name(), source.as_bytes())
            .unwrap();
        assert!(!unit_names(&resolution).iter().any(|n| n.contains("exotic")));
    }

    #[test]
    fn compat_imports_collapse_to_the_bundled_package() {
        let tree = tempfile::tempdir().unwrap();
        write_core_tree(tree.path());
        fs::create_dir_all(tree.path().join("compat")).unwrap();
        fs::write(tree.path().join("compat/__init__.py"), "# shims\n").unwrap();

        let resolution = resolver_for(tree.path())
            .resolve(&entry_name(), b"from bosun.task_utils.compat import typing\n")
            .unwrap();

        let names = unit_names(&resolution);
        assert!(names.contains(&"bosun.task_utils.compat".to_string()));
        assert!(!names.contains(&"bosun.task_utils.compat.typing".to_string()));
    }

    fn pack_root_with_routing(routing_yaml: &str) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let pack = root.path().join("bosun_packs/acme/tools");
        fs::create_dir_all(pack.join("plugins/task_utils")).unwrap();
        fs::create_dir_all(pack.join("meta")).unwrap();
        fs::write(pack.join("meta/runtime.yml"), routing_yaml).unwrap();
        fs::write(pack.join("plugins/task_utils/new.py"), "fresh = True\n").unwrap();
        root
    }

    #[test]
    fn redirects_carry_both_shim_and_target() {
        let core = tempfile::tempdir().unwrap();
        write_core_tree(core.path());
        let pack_root = pack_root_with_routing(
            "unit_routing:\n  task_utils:\n    old:\n      redirect: acme.tools.new\n",
        );

        let locations = DirPackLocations::new(vec![pack_root.path().to_path_buf()]);
        let resolver = DependencyResolver::new(
            vec![core.path().to_path_buf()],
            Arc::new(locations.clone()),
            Arc::new(MetaRuntimeProvider::new(locations, None)),
        );

        let resolution = resolver
            .resolve(
                &entry_name(),
                b"import bosun_packs.acme.tools.plugins.task_utils.old\n",
            )
            .unwrap();

        let names = unit_names(&resolution);
        for expected in [
            "bosun_packs",
            "bosun_packs.acme",
            "bosun_packs.acme.tools",
            "bosun_packs.acme.tools.plugins",
            "bosun_packs.acme.tools.plugins.task_utils",
            "bosun_packs.acme.tools.plugins.task_utils.old",
            "bosun_packs.acme.tools.plugins.task_utils.new",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }

        let shim = &resolution.units
            [&UnitName::from_dotted("bosun_packs.acme.tools.plugins.task_utils.old")];
        let shim_text = String::from_utf8(shim.source.clone()).unwrap();
        assert!(shim_text.contains("import bosun_packs.acme.tools.plugins.task_utils.new as mod"));
        assert_eq!(
            shim.archive_path,
            "bosun_packs/acme/tools/plugins/task_utils/old/__init__.py"
        );

        let target = &resolution.units
            [&UnitName::from_dotted("bosun_packs.acme.tools.plugins.task_utils.new")];
        assert_eq!(target.source, b"fresh = True\n");
    }

    #[test]
    fn tombstoned_required_imports_fail_the_build() {
        let core = tempfile::tempdir().unwrap();
        write_core_tree(core.path());
        let pack_root = pack_root_with_routing(concat!(
            "unit_routing:\n",
            "  task_utils:\n",
            "    gone:\n",
            "      tombstone:\n",
            "        warning_text: switched to new\n",
        ));

        let locations = DirPackLocations::new(vec![pack_root.path().to_path_buf()]);
        let resolver = DependencyResolver::new(
            vec![core.path().to_path_buf()],
            Arc::new(locations.clone()),
            Arc::new(MetaRuntimeProvider::new(locations, None)),
        );

        let err = resolver
            .resolve(
                &entry_name(),
                b"import bosun_packs.acme.tools.plugins.task_utils.gone\n",
            )
            .unwrap_err();
        match err {
            PayloadError::RedirectTombstone { unit, reason } => {
                assert!(unit.ends_with(".gone"));
                assert!(reason.contains("switched to new"));
            }
            other => panic!("expected RedirectTombstone, got {other:?}"),
        }

        // The same import inside a try block is optional and gets dropped.
        let source = concat!(
            "try:\n",
            "    import bosun_packs.acme.tools.plugins.task_utils.gone\n",
            "except ImportError:\n",
            "    pass\n",
        );
        let resolution = resolver.resolve(&entry_name(), source.as_bytes()).unwrap();
        assert!(!unit_names(&resolution).iter().any(|n| n.ends_with(".gone")));
    }

    #[test]
    fn pack_references_mix_required_ambiguous_and_optional_outcomes() {
        let core = tempfile::tempdir().unwrap();
        write_core_tree(core.path());
        let pack_root = pack_root_with_routing("{}\n");
        let pack = pack_root.path().join("bosun_packs/acme/tools");
        fs::write(pack.join("plugins/task_utils/foo.py"), "ready = True\n").unwrap();
        fs::write(pack.join("plugins/task_utils/bar.py"), "BAZ = 3\n").unwrap();

        let locations = DirPackLocations::new(vec![pack_root.path().to_path_buf()]);
        let resolver = DependencyResolver::new(
            vec![core.path().to_path_buf()],
            Arc::new(locations.clone()),
            Arc::new(MetaRuntimeProvider::new(locations, None)),
        );

        let source = concat!(
            "import bosun_packs.acme.tools.plugins.task_utils.foo\n",
            "def fetch():\n",
            "    import bosun_packs.acme.tools.plugins.task_utils.bar.BAZ\n",
            "    import bosun_packs.acme.tools.plugins.task_utils.qux\n",
        );
        let resolution = resolver.resolve(&entry_name(), source.as_bytes()).unwrap();

        let names = unit_names(&resolution);
        assert!(names.contains(&"bosun_packs.acme.tools.plugins.task_utils.foo".to_string()));
        // BAZ is an attribute, so the ambiguous fallback lands on bar itself.
        assert!(names.contains(&"bosun_packs.acme.tools.plugins.task_utils.bar".to_string()));
        assert!(!names.iter().any(|n| n.ends_with("BAZ")));
        assert!(!names.iter().any(|n| n.ends_with("qux")));
    }

    #[test]
    fn builtin_routing_applies_to_the_core_tree() {
        let core = tempfile::tempdir().unwrap();
        write_core_tree(core.path());
        let pack_root = pack_root_with_routing("{}\n");

        let locations = DirPackLocations::new(vec![pack_root.path().to_path_buf()]);
        let routing = StaticRoutingProvider::new().with_table(
            BUILTIN_ROUTING_IDENTITY,
            serde_yaml::from_str::<RuntimeMetadata>(
                "unit_routing:\n  task_utils:\n    moved:\n      redirect: acme.tools.new\n",
            )
            .unwrap(),
        );
        let resolver = DependencyResolver::new(
            vec![core.path().to_path_buf()],
            Arc::new(locations),
            Arc::new(routing),
        );

        let resolution = resolver
            .resolve(&entry_name(), b"import bosun.task_utils.moved\n")
            .unwrap();

        let names = unit_names(&resolution);
        assert!(names.contains(&"bosun.task_utils.moved".to_string()));
        assert!(names.contains(&"bosun_packs.acme.tools.plugins.task_utils.new".to_string()));
    }

    #[test]
    fn unknown_profiles_fail_before_any_lookup() {
        let tree = tempfile::tempdir().unwrap();
        write_core_tree(tree.path());

        let source = "METADATA = '''\nschema_version: 1\nserialization_profile: cbor\n'''\n";
        let err = resolver_for(tree.path())
            .resolve(&entry_name(), source.as_bytes())
            .unwrap_err();
        match err {
            PayloadError::UnsupportedProfile { profile } => assert_eq!(profile, "cbor"),
            other => panic!("expected UnsupportedProfile, got {other:?}"),
        }
    }

    #[test]
    fn broken_support_sources_name_the_unit() {
        let tree = tempfile::tempdir().unwrap();
        write_core_tree(tree.path());
        fs::write(tree.path().join("broken.py"), "def broken(:\n").unwrap();

        let err = resolver_for(tree.path())
            .resolve(&entry_name(), b"import bosun.task_utils.broken\n")
            .unwrap_err();
        match err {
            PayloadError::ModuleParse { unit, .. } => {
                assert_eq!(unit, "bosun.task_utils.broken");
            }
            other => panic!("expected ModuleParse, got {other:?}"),
        }
    }
}
