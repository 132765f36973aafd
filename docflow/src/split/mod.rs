//! Length monitor and splitter.
//!
//! A post-commit pass over the artifact store that enforces a per-class
//! size budget: oversized artifacts are split into an index plus ordered
//! parts, every cross-reference is rewritten to its new location, and the
//! pre-split original is archived. The pass runs single-threaded so two
//! splits of the same artifact can never race.

mod plan;
mod section;

pub use plan::{plan_split, PlannedPart, SplitPlan};
pub use section::{anchors_in, atomize, parse_sections, Section};

use crate::config::PipelineConfig;
use crate::core::Artifact;
use crate::errors::{DocflowError, SplitIntegrityError};
use crate::store::ArtifactStore;
use crate::xref::{CrossReferenceIndex, RefLocation};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Producer label recorded on artifacts committed by the splitter.
const SPLITTER_PRODUCER: &str = "length-monitor";

/// One committed split part and its local cross-reference table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitPartRecord {
    /// The committed part artifact name (`{parent}.part-{index}`).
    pub name: String,
    /// The 1-based part index.
    pub index: u32,
    /// The part size in lines.
    pub line_count: usize,
    /// One-line description of the part's coverage.
    pub coverage: String,
    /// In-part anchors mapped to their global locations.
    pub local_refs: HashMap<String, RefLocation>,
}

/// Record of a completed split, kept for idempotence checks and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitRecord {
    /// The parent artifact name.
    pub parent: String,
    /// The version of the parent the split was computed from.
    pub parent_version: u64,
    /// The budget the split enforced.
    pub budget: usize,
    /// The version of the navigation index committed under the parent name.
    pub index_version: u64,
    /// The committed parts.
    pub parts: Vec<SplitPartRecord>,
}

impl SplitRecord {
    /// Returns the per-part line counts, comparable to a fresh plan's
    /// boundaries.
    #[must_use]
    pub fn boundaries(&self) -> Vec<usize> {
        self.parts.iter().map(|p| p.line_count).collect()
    }
}

/// Outcome of one artifact in a splitter pass.
#[derive(Debug, Clone)]
pub enum SplitOutcome {
    /// The artifact fits its budget; nothing to do.
    WithinBudget {
        /// The artifact name.
        artifact: String,
    },
    /// The artifact was split by a previous pass and is unchanged.
    AlreadySplit {
        /// The artifact name.
        artifact: String,
    },
    /// The artifact was split this pass.
    Split {
        /// The parent artifact name.
        artifact: String,
        /// The parent version that was split.
        version: u64,
        /// The committed part names, in order.
        parts: Vec<String>,
    },
    /// A pinned reference blocked the split; the artifact is flagged.
    IntegrityViolation(SplitIntegrityError),
    /// The store rejected an operation mid-split.
    Error {
        /// The artifact name.
        artifact: String,
        /// The failure description.
        message: String,
    },
}

/// A per-part entry in a split report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartSummary {
    /// The part artifact name.
    pub name: String,
    /// The 1-based part index.
    pub index: u32,
    /// The part size in lines.
    pub line_count: usize,
    /// One-line coverage description.
    pub coverage: String,
}

/// Report on an artifact's standing against its size budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitReport {
    /// The artifact name.
    pub artifact: String,
    /// The latest version inspected.
    pub version: u64,
    /// The artifact size in lines (the pre-split original for a split
    /// artifact).
    pub line_count: usize,
    /// The applicable budget.
    pub budget: usize,
    /// Whether the artifact currently satisfies the budget.
    pub within_budget: bool,
    /// Committed parts, empty when unsplit.
    pub parts: Vec<PartSummary>,
    /// The integrity failure blocking an automatic split, if flagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flagged: Option<String>,
}

/// The length monitor and splitter.
#[derive(Debug)]
pub struct Splitter {
    config: PipelineConfig,
    records: DashMap<String, SplitRecord>,
    flagged: DashMap<String, SplitIntegrityError>,
}

impl Splitter {
    /// Creates a splitter with the given configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
            flagged: DashMap::new(),
        }
    }

    /// Runs one enforcement pass over every artifact in the store.
    ///
    /// Within-budget artifacts have their anchors registered and are left
    /// alone; oversized ones are split; split-blocking pins flag the
    /// artifact and the pass continues. Re-running without intervening
    /// commits is a no-op.
    pub fn enforce(
        &self,
        store: &ArtifactStore,
        xref: &CrossReferenceIndex,
    ) -> Vec<SplitOutcome> {
        let mut outcomes = Vec::new();
        for name in store.names() {
            if is_part_name(&name) {
                continue;
            }
            let Ok(artifact) = store.get(&name) else {
                continue;
            };
            outcomes.push(self.enforce_one(store, xref, &name, &artifact));
        }
        outcomes
    }

    fn enforce_one(
        &self,
        store: &ArtifactStore,
        xref: &CrossReferenceIndex,
        name: &str,
        artifact: &Artifact,
    ) -> SplitOutcome {
        let budget = self.config.budget_for(name);

        // An unchanged, previously split artifact is a no-op when the
        // recorded boundaries match a freshly computed plan.
        let recorded = self.records.get(name).map(|r| r.value().clone());
        if let Some(record) = recorded {
            if record.index_version == artifact.version {
                if let Ok(original) = store.get_version(name, record.parent_version) {
                    let fresh =
                        plan_split(&original.content, budget, self.config.merge_threshold);
                    if fresh.boundaries() == record.boundaries() {
                        debug!(artifact = %name, "split is current; no-op");
                        return SplitOutcome::AlreadySplit {
                            artifact: name.to_string(),
                        };
                    }
                    // Boundaries drifted (budget reconfigured): resplit
                    // from the archived original.
                    return self.split_artifact(store, xref, name, &original, budget);
                }
            }
        }

        if artifact.size() <= budget {
            for anchor in anchors_in(&artifact.content) {
                xref.register(anchor.clone(), RefLocation::new(name, 1, anchor));
            }
            return SplitOutcome::WithinBudget {
                artifact: name.to_string(),
            };
        }

        self.split_artifact(store, xref, name, artifact, budget)
    }

    fn split_artifact(
        &self,
        store: &ArtifactStore,
        xref: &CrossReferenceIndex,
        name: &str,
        artifact: &Artifact,
        budget: usize,
    ) -> SplitOutcome {
        let plan = plan_split(&artifact.content, budget, self.config.merge_threshold);

        // A pinned target that would change parts blocks the split.
        for (target, pinned) in xref.pins_for(name) {
            if let Some(proposed) = plan.part_for_anchor(&target) {
                if proposed != pinned.part {
                    let err = SplitIntegrityError::new(
                        name,
                        artifact.version,
                        target,
                        pinned.part,
                        proposed,
                    );
                    warn!(artifact = %name, error = %err, "split blocked by pin; flagged");
                    self.flagged.insert(name.to_string(), err.clone());
                    return SplitOutcome::IntegrityViolation(err);
                }
            }
        }

        let anchor_parts: HashMap<String, u32> = plan
            .parts
            .iter()
            .flat_map(|part| part.anchors().into_iter().map(move |a| (a, part.index)))
            .collect();

        xref.invalidate(name);

        let mut part_records = Vec::with_capacity(plan.part_count());
        let mut part_names = Vec::with_capacity(plan.part_count());
        for part in &plan.parts {
            let part_name = format!("{name}.part-{}", part.index);
            let rewritten = rewrite_references(&part.content(), &anchor_parts, part.index, name);
            store.commit(&part_name, rewritten, Some(SPLITTER_PRODUCER.to_string()));

            let mut local_refs = HashMap::new();
            for anchor in part.anchors() {
                let location = RefLocation::new(part_name.clone(), part.index, anchor.clone());
                xref.register(anchor.clone(), location.clone());
                local_refs.insert(anchor, location);
            }
            part_records.push(SplitPartRecord {
                name: part_name.clone(),
                index: part.index,
                line_count: part.line_count(),
                coverage: part.coverage(),
                local_refs,
            });
            part_names.push(part_name);
        }

        if let Err(err) = store.archive(name, artifact.version) {
            return SplitOutcome::Error {
                artifact: name.to_string(),
                message: err.to_string(),
            };
        }
        let index = store.commit(
            name,
            render_index(name, &part_records, budget),
            Some(SPLITTER_PRODUCER.to_string()),
        );

        self.records.insert(
            name.to_string(),
            SplitRecord {
                parent: name.to_string(),
                parent_version: artifact.version,
                budget,
                index_version: index.version,
                parts: part_records,
            },
        );
        self.flagged.remove(name);

        info!(
            artifact = %name,
            version = artifact.version,
            parts = part_names.len(),
            "artifact split"
        );
        SplitOutcome::Split {
            artifact: name.to_string(),
            version: artifact.version,
            parts: part_names,
        }
    }

    /// Returns the artifacts flagged for manual resolution, with the pin
    /// that blocked each split.
    #[must_use]
    pub fn flagged(&self) -> Vec<SplitIntegrityError> {
        self.flagged.iter().map(|e| e.value().clone()).collect()
    }

    /// Builds a budget report for one artifact.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` if the artifact does not exist.
    pub fn report(
        &self,
        store: &ArtifactStore,
        name: &str,
    ) -> Result<SplitReport, DocflowError> {
        let budget = self.config.budget_for(name);
        let flagged = self.flagged.get(name).map(|e| e.value().to_string());

        if let Some(record) = self.records.get(name) {
            return Ok(SplitReport {
                artifact: name.to_string(),
                version: record.parent_version,
                line_count: record.parts.iter().map(|p| p.line_count).sum(),
                budget,
                within_budget: true,
                parts: record
                    .parts
                    .iter()
                    .map(|p| PartSummary {
                        name: p.name.clone(),
                        index: p.index,
                        line_count: p.line_count,
                        coverage: p.coverage.clone(),
                    })
                    .collect(),
                flagged,
            });
        }

        let artifact = store.get(name).map_err(DocflowError::from)?;
        let within = artifact.size() <= budget;
        let parts = if within {
            Vec::new()
        } else {
            // Preview of what a split would produce.
            plan_split(&artifact.content, budget, self.config.merge_threshold)
                .parts
                .iter()
                .map(|p| PartSummary {
                    name: format!("{name}.part-{}", p.index),
                    index: p.index,
                    line_count: p.line_count(),
                    coverage: p.coverage(),
                })
                .collect()
        };
        Ok(SplitReport {
            artifact: name.to_string(),
            version: artifact.version,
            line_count: artifact.size(),
            budget,
            within_budget: within,
            parts,
            flagged,
        })
    }
}

/// Returns true for `{parent}.part-{N}` artifact names.
#[must_use]
pub fn is_part_name(name: &str) -> bool {
    static PART_RE: OnceLock<Regex> = OnceLock::new();
    let re = PART_RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"\.part-\d+$").unwrap()
    });
    re.is_match(name)
}

/// Rewrites in-document references to their post-split locations.
///
/// References to anchors in the same part keep their local form; references
/// to anchors in other parts point at `{parent}.part-{k}#anchor`. Targets
/// outside this artifact are left untouched for the quality gate to judge.
fn rewrite_references(
    content: &str,
    anchor_parts: &HashMap<String, u32>,
    current_part: u32,
    parent: &str,
) -> String {
    static REF_RE: OnceLock<Regex> = OnceLock::new();
    let re = REF_RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"\]\(#([A-Za-z0-9_-]+)\)").unwrap()
    });

    re.replace_all(content, |caps: &regex::Captures<'_>| {
        let target = &caps[1];
        match anchor_parts.get(target) {
            Some(&part) if part != current_part => {
                format!("]({parent}.part-{part}#{target})")
            }
            _ => caps[0].to_string(),
        }
    })
    .into_owned()
}

fn render_index(name: &str, parts: &[SplitPartRecord], budget: usize) -> String {
    let mut lines = vec![
        format!("# Index of {name}"),
        String::new(),
        format!(
            "Split into {} parts within a budget of {budget} lines.",
            parts.len()
        ),
        String::new(),
    ];
    for part in parts {
        lines.push(format!(
            "{}. [{}]({}) — {}",
            part.index, part.name, part.name, part.coverage
        ));
        let prev = match part.index {
            1 => "none".to_string(),
            i => format!("{name}.part-{}", i - 1),
        };
        let next = if part.index as usize == parts.len() {
            "none".to_string()
        } else {
            format!("{name}.part-{}", part.index + 1)
        };
        lines.push(format!("   prev: {prev} | next: {next}"));
    }
    lines.join("\n")
}
