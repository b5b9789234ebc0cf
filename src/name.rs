//! Dotted unit names.
//!
//! Every piece of Python carried in a payload is identified by a fully
//! qualified dotted name (`bosun.task_utils.basic`,
//! `bosun_packs.acme.net.plugins.task_utils.api`). [`UnitName`] stores the
//! name as owned segments so prefix and ancestry questions are slice
//! operations rather than string parsing, and derives a segment-wise `Ord`
//! so every ordered collection keyed by names iterates deterministically.

use std::fmt;

/// Fully qualified dotted name of a payload unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitName(Vec<String>);

impl UnitName {
    /// Create a name from pre-split segments.
    pub fn new(segments: Vec<String>) -> Self {
        debug_assert!(!segments.is_empty(), "unit names have at least one segment");
        Self(segments)
    }

    /// Parse a dotted name such as `bosun.task_utils.basic`.
    pub fn from_dotted(name: &str) -> Self {
        Self::new(name.split('.').map(str::to_string).collect())
    }

    /// Build a name from any iterable of segment-like values.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(segments.into_iter().map(Into::into).collect())
    }

    /// The name's segments, in order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the name has no segments. Does not occur for names built
    /// through the public constructors.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First segment, the namespace root.
    pub fn first(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// Final segment, the unit's own name.
    pub fn last(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// The dotted form.
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }

    /// Extend the name by one segment.
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    /// The name with its final segment removed, if any segments would remain.
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() > 1 {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        } else {
            None
        }
    }

    /// Proper prefixes of the name, shortest first. `a.b.c` yields `a`, `a.b`.
    pub fn ancestors(&self) -> impl Iterator<Item = UnitName> + '_ {
        (1..self.0.len()).map(|n| Self(self.0[..n].to_vec()))
    }

    /// True when the name starts with the given segments.
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        self.0.len() >= prefix.len() && self.0.iter().zip(prefix).all(|(seg, want)| seg == want)
    }

    /// Slash-joined form used for paths inside the payload container.
    pub fn archive_path(&self) -> String {
        self.0.join("/")
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn dotted_roundtrip() {
        let name = UnitName::from_dotted("bosun.task_utils.basic");
        assert_eq!(name.segments(), ["bosun", "task_utils", "basic"]);
        assert_eq!(name.dotted(), "bosun.task_utils.basic");
        assert_eq!(name.to_string(), "bosun.task_utils.basic");
        assert_eq!(name.first(), "bosun");
        assert_eq!(name.last(), "basic");
    }

    #[test]
    fn ancestors_shortest_first() {
        let name = UnitName::from_dotted("a.b.c.d");
        let prefixes: Vec<String> = name.ancestors().map(|a| a.dotted()).collect();
        assert_eq!(prefixes, ["a", "a.b", "a.b.c"]);
    }

    #[test]
    fn single_segment_has_no_parent() {
        let name = UnitName::from_dotted("bosun");
        assert_eq!(name.parent(), None);
        assert_eq!(name.ancestors().count(), 0);
    }

    #[test]
    fn prefix_matching_is_segment_wise() {
        let name = UnitName::from_dotted("bosun.task_utils.basic");
        assert!(name.starts_with(&["bosun", "task_utils"]));
        assert!(!name.starts_with(&["bosun", "task"]));
        assert!(!name.starts_with(&["bosun", "task_utils", "basic", "deep"]));
    }

    #[test]
    fn ordering_is_stable_across_namespaces() {
        let mut names = BTreeSet::new();
        names.insert(UnitName::from_dotted("bosun.task_utils.b"));
        names.insert(UnitName::from_dotted("bosun.task_utils.a.x"));
        names.insert(UnitName::from_dotted("bosun.task_utils.a"));
        let ordered: Vec<String> = names.iter().map(UnitName::dotted).collect();
        assert_eq!(
            ordered,
            ["bosun.task_utils.a", "bosun.task_utils.a.x", "bosun.task_utils.b"]
        );
    }

    #[test]
    fn archive_path_uses_slashes() {
        let name = UnitName::from_dotted("bosun_packs.acme.net.plugins.task_utils.api");
        assert_eq!(name.archive_path(), "bosun_packs/acme/net/plugins/task_utils/api");
    }
}
