//! Cross-reference index.
//!
//! Maps logical reference targets to physical (artifact, part, anchor)
//! locations. Consulted by the splitter when rewriting references and by
//! the quality gate when checking that every committed reference resolves.

use crate::core::Artifact;
use crate::errors::UnresolvedReferenceError;
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A physical reference location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefLocation {
    /// The artifact holding the target.
    pub artifact: String,
    /// The 1-based part index within the artifact family.
    pub part: u32,
    /// The local anchor within the part.
    pub anchor: String,
}

impl RefLocation {
    /// Creates a new location.
    #[must_use]
    pub fn new(artifact: impl Into<String>, part: u32, anchor: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            part,
            anchor: anchor.into(),
        }
    }
}

/// The index from logical targets to physical locations.
///
/// Pins are registered separately: a pinned target is one already cited by
/// an out-of-pipeline document, and the splitter refuses any plan that
/// would move it.
#[derive(Debug, Default)]
pub struct CrossReferenceIndex {
    targets: DashMap<String, RefLocation>,
    pins: DashMap<String, RefLocation>,
}

impl CrossReferenceIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or updates) the location of a logical target.
    pub fn register(&self, target: impl Into<String>, location: RefLocation) {
        self.targets.insert(target.into(), location);
    }

    /// Resolves a logical target, if registered.
    #[must_use]
    pub fn resolve(&self, target: &str) -> Option<RefLocation> {
        self.targets.get(target).map(|loc| loc.clone())
    }

    /// Resolves a logical target, failing with the referring artifact in
    /// the error context.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedReferenceError` if the target is unregistered.
    pub fn require(
        &self,
        target: &str,
        referring_artifact: &str,
    ) -> Result<RefLocation, UnresolvedReferenceError> {
        self.resolve(target)
            .ok_or_else(|| UnresolvedReferenceError::new(target, referring_artifact))
    }

    /// Drops every registered location inside an artifact's family (the
    /// artifact itself and its `.part-N` artifacts). Called before an
    /// artifact is resplit. Pins are never dropped.
    pub fn invalidate(&self, artifact: &str) {
        let part_prefix = format!("{artifact}.part-");
        self.targets
            .retain(|_, loc| loc.artifact != artifact && !loc.artifact.starts_with(&part_prefix));
    }

    /// Pins a target to its externally cited location.
    pub fn pin(&self, target: impl Into<String>, location: RefLocation) {
        self.pins.insert(target.into(), location);
    }

    /// Returns the pinned location of a target, if pinned.
    #[must_use]
    pub fn pinned(&self, target: &str) -> Option<RefLocation> {
        self.pins.get(target).map(|loc| loc.clone())
    }

    /// Returns the pins whose location lies in the given artifact family.
    #[must_use]
    pub fn pins_for(&self, artifact: &str) -> Vec<(String, RefLocation)> {
        let part_prefix = format!("{artifact}.part-");
        self.pins
            .iter()
            .filter(|entry| {
                entry.value().artifact == artifact
                    || entry.value().artifact.starts_with(&part_prefix)
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Returns the reference targets in an artifact's content that do not
    /// resolve. An empty result is the post-split guarantee.
    #[must_use]
    pub fn unresolved_targets(&self, artifact: &Artifact) -> Vec<String> {
        scan_references(&artifact.content)
            .into_iter()
            .filter(|target| !self.targets.contains_key(target))
            .collect()
    }

    /// Returns the number of registered targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns true if no targets are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Extracts the logical targets of every in-document reference
/// (`](#target)` links) in order of appearance, without duplicates.
#[must_use]
pub fn scan_references(content: &str) -> Vec<String> {
    static REF_RE: OnceLock<Regex> = OnceLock::new();
    let re = REF_RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"\]\(#([A-Za-z0-9_-]+)\)").unwrap()
    });

    let mut seen = std::collections::HashSet::new();
    let mut targets = Vec::new();
    for capture in re.captures_iter(content) {
        let target = capture[1].to_string();
        if seen.insert(target.clone()) {
            targets.push(target);
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let index = CrossReferenceIndex::new();
        index.register("methods", RefLocation::new("report.part-2", 2, "methods"));

        let loc = index.resolve("methods").unwrap();
        assert_eq!(loc.artifact, "report.part-2");
        assert_eq!(loc.part, 2);
        assert!(index.resolve("unknown").is_none());
    }

    #[test]
    fn test_require_carries_referring_artifact() {
        let index = CrossReferenceIndex::new();
        let err = index.require("ghost", "draft").unwrap_err();
        assert_eq!(err.target, "ghost");
        assert_eq!(err.artifact, "draft");
    }

    #[test]
    fn test_invalidate_family_keeps_pins() {
        let index = CrossReferenceIndex::new();
        index.register("intro", RefLocation::new("report", 1, "intro"));
        index.register("methods", RefLocation::new("report.part-2", 2, "methods"));
        index.register("other", RefLocation::new("appendix", 1, "other"));
        index.pin("intro", RefLocation::new("report", 1, "intro"));

        index.invalidate("report");

        assert!(index.resolve("intro").is_none());
        assert!(index.resolve("methods").is_none());
        assert!(index.resolve("other").is_some());
        assert!(index.pinned("intro").is_some());
    }

    #[test]
    fn test_pins_for_family() {
        let index = CrossReferenceIndex::new();
        index.pin("intro", RefLocation::new("report", 1, "intro"));
        index.pin("tables", RefLocation::new("appendix", 1, "tables"));

        let pins = index.pins_for("report");
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].0, "intro");
    }

    #[test]
    fn test_scan_references_dedupes_in_order() {
        let content = "See [Methods](#methods) and [Results](#results), \
                       also [methods again](#methods).";
        assert_eq!(scan_references(content), vec!["methods", "results"]);
    }

    #[test]
    fn test_unresolved_targets() {
        let index = CrossReferenceIndex::new();
        index.register("methods", RefLocation::new("report", 1, "methods"));

        let artifact = crate::core::Artifact::new(
            "draft",
            1,
            "[ok](#methods) and [broken](#missing)",
            None,
        );
        assert_eq!(index.unresolved_targets(&artifact), vec!["missing"]);
    }
}
