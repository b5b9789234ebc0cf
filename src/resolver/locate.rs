//! Namespace-specific unit location.
//!
//! Given a dependency request, a locator decides which candidate names to
//! try, consults routing tables for redirects and tombstones, and reads
//! unit source from the filesystem. The two namespaces differ in lookup
//! order: the core tree prefers physical files and only then falls back to
//! the builtin routing table, while packs honor their routing table before
//! touching the filesystem so redirects keep working after a rename leaves
//! the old file behind.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::constants::{
    BUILTIN_ROUTING_IDENTITY, COMPAT_UNIT, CORE_NAMESPACE, PACK_NAMESPACE_ROOT, PACK_PLUGIN_PATH,
    PACK_UNIT_MIN_SEGMENTS,
};
use crate::core::PayloadError;
use crate::name::UnitName;
use crate::routing::{PackLocationProvider, RoutingProvider};

use super::DependencyRequest;

/// Result of a location attempt.
#[derive(Debug)]
pub(super) enum Location {
    Found(LocatedUnit),
    NotFound { candidates: Vec<UnitName> },
}

/// A unit with source in hand, under its canonical name.
#[derive(Debug)]
pub(super) struct LocatedUnit {
    pub name: UnitName,
    pub source: Vec<u8>,
    pub is_package: bool,
    /// True when this unit is a generated redirect shim.
    pub redirected: bool,
}

impl LocatedUnit {
    /// Path of the unit's file inside the payload container.
    pub fn archive_path(&self) -> String {
        if self.is_package {
            format!("{}/__init__.py", self.name.archive_path())
        } else {
            format!("{}.py", self.name.archive_path())
        }
    }
}

/// Source read from disk (or synthesized) before canonicalization.
struct PhysicalSource {
    source: Vec<u8>,
    is_package: bool,
}

enum RedirectOutcome {
    None,
    Redirect(UnitName),
    /// Tombstone on an optional import; the candidate is dropped.
    Dropped,
}

/// One support namespace's location rules. `locate` drives the shared
/// candidate loop; implementations supply the namespace-specific pieces.
pub(super) trait UnitLocator {
    /// Whether routing redirects are honored before filesystem lookup.
    fn redirect_first(&self) -> bool;

    /// Candidate names to try, most specific first.
    fn candidates(&self, request: &DependencyRequest) -> Vec<UnitName>;

    /// Routing table identity covering this name.
    fn routing_identity(&self, name: &UnitName) -> String;

    /// Dotted name below the namespace's routing root; empty at or above it.
    fn remainder(&self, name: &UnitName) -> String;

    /// Read the candidate's source from the filesystem.
    fn find_physical(&self, candidate: &UnitName) -> Result<Option<PhysicalSource>, PayloadError>;

    fn routing(&self) -> &dyn RoutingProvider;

    fn locate(&self, request: &DependencyRequest) -> Result<Location, PayloadError> {
        let candidates = self.candidates(request);
        for candidate in &candidates {
            if self.redirect_first() {
                match self.check_redirect(candidate, request)? {
                    RedirectOutcome::Redirect(target) => return Ok(shim_unit(candidate, &target)),
                    RedirectOutcome::Dropped => continue,
                    RedirectOutcome::None => {}
                }
                if let Some(physical) = self.find_physical(candidate)? {
                    return Ok(found_unit(candidate, physical));
                }
            } else {
                if let Some(physical) = self.find_physical(candidate)? {
                    return Ok(found_unit(candidate, physical));
                }
                match self.check_redirect(candidate, request)? {
                    RedirectOutcome::Redirect(target) => return Ok(shim_unit(candidate, &target)),
                    RedirectOutcome::Dropped => continue,
                    RedirectOutcome::None => {}
                }
            }
        }

        if request.child_redirected {
            // A child of this package resolved through a redirect, so the
            // package has no physical file of its own. Carry it as an empty
            // package so the shim's import machinery can traverse it.
            let name = candidates
                .last()
                .cloned()
                .unwrap_or_else(|| request.name.clone());
            debug!(unit = %name, "synthesizing empty package for redirected child");
            return Ok(Location::Found(LocatedUnit {
                name,
                source: Vec::new(),
                is_package: true,
                redirected: false,
            }));
        }

        Ok(Location::NotFound { candidates })
    }

    fn check_redirect(
        &self,
        candidate: &UnitName,
        request: &DependencyRequest,
    ) -> Result<RedirectOutcome, PayloadError> {
        let remainder = self.remainder(candidate);
        if remainder.is_empty() {
            return Ok(RedirectOutcome::None);
        }

        let identity = self.routing_identity(candidate);
        let table = match self.routing().routing_for(&identity) {
            Ok(table) => table,
            Err(err) if request.is_optional => {
                debug!(
                    identity,
                    error = format!("{err:#}"),
                    "ignoring unloadable routing table for optional import"
                );
                return Ok(RedirectOutcome::None);
            }
            Err(err) => {
                return Err(PayloadError::RoutingError {
                    pack: identity,
                    reason: format!("{err:#}"),
                });
            }
        };
        let Some(table) = table else {
            return Ok(RedirectOutcome::None);
        };
        let Some(entry) = table.unit_entry(&remainder) else {
            return Ok(RedirectOutcome::None);
        };

        if let Some(tombstone) = &entry.tombstone {
            if request.is_optional {
                debug!(unit = %candidate, "dropping optional import of tombstoned unit");
                return Ok(RedirectOutcome::Dropped);
            }
            return Err(PayloadError::RedirectTombstone {
                unit: candidate.dotted(),
                reason: tombstone.describe(),
            });
        }

        if let Some(deprecation) = &entry.deprecation {
            warn!(
                unit = %candidate,
                "support unit is deprecated: {}",
                deprecation.describe()
            );
        }

        let Some(target) = &entry.redirect else {
            return Ok(RedirectOutcome::None);
        };
        let target = expand_redirect_target(candidate, &identity, target)?;
        debug!(unit = %candidate, target = %target, "following routing redirect");
        Ok(RedirectOutcome::Redirect(target))
    }
}

/// Locator for the core `bosun.task_utils` tree.
pub(super) struct CoreLocator<'a> {
    pub support_paths: &'a [PathBuf],
    pub routing: &'a dyn RoutingProvider,
}

impl UnitLocator for CoreLocator<'_> {
    fn redirect_first(&self) -> bool {
        false
    }

    fn candidates(&self, request: &DependencyRequest) -> Vec<UnitName> {
        let name = &request.name;
        if name.segments().get(2).map(String::as_str) == Some(COMPAT_UNIT[2]) {
            // The compat subtree ships as one package; any reference into
            // it pulls the whole package.
            return vec![UnitName::from_segments(COMPAT_UNIT)];
        }
        let mut candidates = vec![name.clone()];
        if request.is_ambiguous && name.len() > CORE_NAMESPACE.len() + 1 {
            if let Some(parent) = name.parent() {
                candidates.push(parent);
            }
        }
        candidates
    }

    fn routing_identity(&self, _name: &UnitName) -> String {
        BUILTIN_ROUTING_IDENTITY.to_string()
    }

    fn remainder(&self, name: &UnitName) -> String {
        name.segments()
            .get(CORE_NAMESPACE.len()..)
            .unwrap_or_default()
            .join(".")
    }

    fn find_physical(&self, candidate: &UnitName) -> Result<Option<PhysicalSource>, PayloadError> {
        let relative = candidate
            .segments()
            .get(CORE_NAMESPACE.len()..)
            .unwrap_or_default();
        let Some((leaf, dirs)) = relative.split_last() else {
            return Ok(None);
        };
        for root in self.support_paths {
            let mut dir = root.to_path_buf();
            for part in dirs {
                dir.push(part);
            }
            if let Some(found) = read_unit_at(&dir, leaf)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn routing(&self) -> &dyn RoutingProvider {
        self.routing
    }
}

/// Locator for `bosun_packs.<ns>.<pack>.plugins.task_utils` trees.
pub(super) struct PackLocator<'a> {
    pub locations: &'a dyn PackLocationProvider,
    pub routing: &'a dyn RoutingProvider,
}

impl UnitLocator for PackLocator<'_> {
    fn redirect_first(&self) -> bool {
        true
    }

    fn candidates(&self, request: &DependencyRequest) -> Vec<UnitName> {
        let name = &request.name;
        let mut candidates = vec![name.clone()];
        if request.is_ambiguous && name.len() > PACK_UNIT_MIN_SEGMENTS {
            if let Some(parent) = name.parent() {
                candidates.push(parent);
            }
        }
        candidates
    }

    fn routing_identity(&self, name: &UnitName) -> String {
        name.segments().get(1..3).unwrap_or_default().join(".")
    }

    fn remainder(&self, name: &UnitName) -> String {
        name.segments()
            .get(PACK_UNIT_MIN_SEGMENTS - 1..)
            .unwrap_or_default()
            .join(".")
    }

    fn find_physical(&self, candidate: &UnitName) -> Result<Option<PhysicalSource>, PayloadError> {
        let segments = candidate.segments();
        if segments.len() < PACK_UNIT_MIN_SEGMENTS {
            // Names at or above plugins/task_utils are namespace levels;
            // they are carried as empty packages, never read from disk.
            return Ok(Some(PhysicalSource {
                source: Vec::new(),
                is_package: true,
            }));
        }

        let Some(install_dir) = self.locations.locate_pack(&segments[1], &segments[2]) else {
            return Ok(None);
        };
        let relative = &segments[3..];
        let Some((leaf, dirs)) = relative.split_last() else {
            return Ok(None);
        };
        let mut dir = install_dir;
        for part in dirs {
            dir.push(part);
        }
        read_unit_at(&dir, leaf)
    }

    fn routing(&self) -> &dyn RoutingProvider {
        self.routing
    }
}

/// True for pack references whose shape cannot name a support unit, such
/// as `bosun_packs.ns.pack.plugins.lookup.thing`.
pub(super) fn malformed_pack_reference(name: &UnitName) -> bool {
    let segments = name.segments();
    segments.len() >= PACK_UNIT_MIN_SEGMENTS
        && segments[3..PACK_UNIT_MIN_SEGMENTS - 1] != PACK_PLUGIN_PATH
}

fn found_unit(candidate: &UnitName, physical: PhysicalSource) -> Location {
    Location::Found(LocatedUnit {
        name: candidate.clone(),
        source: physical.source,
        is_package: physical.is_package,
        redirected: false,
    })
}

fn shim_unit(candidate: &UnitName, target: &UnitName) -> Location {
    Location::Found(LocatedUnit {
        name: candidate.clone(),
        source: redirect_shim(candidate, target),
        is_package: true,
        redirected: true,
    })
}

/// Generated source for a redirected unit. Importing the shim imports the
/// target and aliases the old name to it, so the redirect is transparent
/// to task code on the remote host.
fn redirect_shim(source: &UnitName, target: &UnitName) -> Vec<u8> {
    format!("\nimport sys\nimport {target} as mod\n\nsys.modules['{source}'] = mod\n").into_bytes()
}

/// Expand a routing redirect target to a full unit name. Short targets
/// use the `<ns>.<pack>.<unit>` form.
fn expand_redirect_target(
    source: &UnitName,
    identity: &str,
    target: &str,
) -> Result<UnitName, PayloadError> {
    let segments: Vec<&str> = target.split('.').collect();
    if segments.first().copied() == Some(PACK_NAMESPACE_ROOT) {
        return Ok(UnitName::from_segments(segments));
    }
    if segments.len() < 3 {
        return Err(PayloadError::RoutingError {
            pack: identity.to_string(),
            reason: format!("invalid redirect for '{source}': '{target}'"),
        });
    }
    let mut expanded: Vec<String> = vec![
        PACK_NAMESPACE_ROOT.to_string(),
        segments[0].to_string(),
        segments[1].to_string(),
    ];
    expanded.extend(PACK_PLUGIN_PATH.iter().map(|s| s.to_string()));
    expanded.extend(segments[2..].iter().map(|s| s.to_string()));
    Ok(UnitName::new(expanded))
}

/// Check `dir` for a unit named `leaf`: a package directory with an
/// `__init__.py` wins over a plain module file.
fn read_unit_at(dir: &Path, leaf: &str) -> Result<Option<PhysicalSource>, PayloadError> {
    let package_init = dir.join(leaf).join("__init__.py");
    if package_init.is_file() {
        return Ok(Some(PhysicalSource {
            source: std::fs::read(&package_init)?,
            is_package: true,
        }));
    }
    let module_file = dir.join(format!("{leaf}.py"));
    if module_file.is_file() {
        return Ok(Some(PhysicalSource {
            source: std::fs::read(&module_file)?,
            is_package: false,
        }));
    }
    Ok(None)
}
