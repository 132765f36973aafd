//! Compilation and quality gate.
//!
//! Maps finished artifacts onto a target output structure, runs validation
//! checks, and emits a readiness report distinguishing ready from
//! conditional sections. Assembly never blocks on conditional sections: it
//! always produces a complete draft annotated with readiness status.

mod gates;

pub use gates::{run_gates, FnValidator, GateOutcome, QualityGateResult, Validator};

use crate::core::Artifact;
use crate::store::ArtifactStore;
use crate::xref::CrossReferenceIndex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Built-in check name for a missing source artifact.
const CHECK_AVAILABILITY: &str = "availability";

/// Built-in check name for unresolved cross-references.
const CHECK_XREF: &str = "cross-references";

/// One target output section and its ordered source artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionMapping {
    /// The section title.
    pub title: String,
    /// Source artifact names, in assembly order.
    pub sources: Vec<String>,
    /// Whether a failing gate here should fail the whole deliverable.
    #[serde(default)]
    pub required: bool,
}

impl SectionMapping {
    /// Creates a new section mapping.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            sources: Vec::new(),
            required: false,
        }
    }

    /// Appends a source artifact.
    #[must_use]
    pub fn with_source(mut self, name: impl Into<String>) -> Self {
        self.sources.push(name.into());
        self
    }

    /// Marks the section as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Declarative mapping from target sections to source artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMapping {
    /// The deliverable name.
    pub name: String,
    /// The ordered target sections.
    pub sections: Vec<SectionMapping>,
}

impl AssemblyMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: Vec::new(),
        }
    }

    /// Appends a section.
    #[must_use]
    pub fn with_section(mut self, section: SectionMapping) -> Self {
        self.sections.push(section);
        self
    }

    /// Returns every source artifact name referenced by the mapping.
    #[must_use]
    pub fn source_names(&self) -> Vec<String> {
        self.sections
            .iter()
            .flat_map(|s| s.sources.iter().cloned())
            .collect()
    }
}

/// Readiness classification of an assembled section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionReadiness {
    /// Every gate touching the section's sources passed.
    Ready,
    /// At least one gate failed; shipped with caveats.
    Conditional,
}

/// A failing check attached to a conditional section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedCheck {
    /// The check name.
    pub check: String,
    /// The artifact the check failed on.
    pub artifact: String,
    /// Diagnostic messages.
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

/// Per-section entry of the readiness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionReport {
    /// The section title.
    pub title: String,
    /// Whether the section was marked required in the mapping.
    pub required: bool,
    /// The readiness classification.
    pub readiness: SectionReadiness,
    /// The specific failing checks, empty when ready.
    #[serde(default)]
    pub failing_checks: Vec<FailedCheck>,
}

/// The readiness report accompanying every deliverable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    /// The deliverable name.
    pub deliverable: String,
    /// Per-section readiness.
    pub sections: Vec<SectionReport>,
    /// Every gate verdict recorded during this assembly.
    pub gate_results: Vec<QualityGateResult>,
    /// When the report was generated (ISO 8601).
    pub generated_at: String,
}

impl ReadinessReport {
    /// Returns true when a required section is conditional.
    #[must_use]
    pub fn has_required_failures(&self) -> bool {
        self.sections
            .iter()
            .any(|s| s.required && s.readiness == SectionReadiness::Conditional)
    }

    /// Returns the titles of conditional sections.
    #[must_use]
    pub fn conditional_sections(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| s.readiness == SectionReadiness::Conditional)
            .map(|s| s.title.as_str())
            .collect()
    }
}

/// The assembled deliverable and its readiness report.
#[derive(Debug, Clone)]
pub struct AssemblyResult {
    /// The complete deliverable draft, readiness annotations included.
    pub deliverable: String,
    /// The readiness report.
    pub report: ReadinessReport,
}

/// Assembles the deliverable from the mapping and runs every gate.
///
/// A section is ready only if all gates touching its source artifacts pass,
/// including the built-in availability and cross-reference checks. A
/// conditional section is still assembled, annotated with its failing
/// checks, so the human-facing process can decide whether to ship with
/// caveats.
#[must_use]
pub fn assemble(
    mapping: &AssemblyMapping,
    store: &ArtifactStore,
    xref: &CrossReferenceIndex,
    validators: &[Arc<dyn Validator>],
) -> AssemblyResult {
    let mut sections = Vec::with_capacity(mapping.sections.len());
    let mut gate_results = Vec::new();
    let mut body = vec![format!("# {}", mapping.name), String::new()];

    for section in &mapping.sections {
        let mut failing: Vec<FailedCheck> = Vec::new();
        let mut contents: Vec<String> = Vec::new();

        for source in &section.sources {
            match store.get(source) {
                Ok(artifact) => {
                    gate_results.extend(check_artifact(
                        &artifact,
                        xref,
                        validators,
                        &mut failing,
                    ));
                    contents.push(artifact.content.clone());
                }
                Err(err) => {
                    warn!(section = %section.title, artifact = %source, "source unavailable");
                    failing.push(FailedCheck {
                        check: CHECK_AVAILABILITY.to_string(),
                        artifact: source.clone(),
                        diagnostics: vec![err.to_string()],
                    });
                    contents.push(format!("[missing artifact '{source}']"));
                }
            }
        }

        let readiness = if failing.is_empty() {
            SectionReadiness::Ready
        } else {
            SectionReadiness::Conditional
        };

        body.push(format!("## {}", section.title));
        match readiness {
            SectionReadiness::Ready => body.push("<!-- readiness: ready -->".to_string()),
            SectionReadiness::Conditional => {
                let checks: Vec<String> = failing
                    .iter()
                    .map(|f| format!("{} ({})", f.check, f.artifact))
                    .collect();
                body.push(format!(
                    "<!-- readiness: conditional; failing: {} -->",
                    checks.join(", ")
                ));
            }
        }
        body.push(String::new());
        body.extend(contents);
        body.push(String::new());

        sections.push(SectionReport {
            title: section.title.clone(),
            required: section.required,
            readiness,
            failing_checks: failing,
        });
    }

    let report = ReadinessReport {
        deliverable: mapping.name.clone(),
        sections,
        gate_results,
        generated_at: crate::util::iso_timestamp(),
    };
    info!(
        deliverable = %report.deliverable,
        conditional = report.conditional_sections().len(),
        "assembly complete"
    );

    AssemblyResult {
        deliverable: body.join("\n"),
        report,
    }
}

/// Runs the built-in cross-reference check and the external validators on
/// one artifact, collecting failures.
fn check_artifact(
    artifact: &Artifact,
    xref: &CrossReferenceIndex,
    validators: &[Arc<dyn Validator>],
    failing: &mut Vec<FailedCheck>,
) -> Vec<QualityGateResult> {
    let mut results = Vec::new();

    // An unresolvable reference is a hard gate failure, never dropped.
    let unresolved = xref.unresolved_targets(artifact);
    let xref_outcome = if unresolved.is_empty() {
        GateOutcome::passed()
    } else {
        GateOutcome::failed(
            unresolved
                .iter()
                .map(|t| format!("unresolved reference '{t}'")),
        )
    };
    record(artifact, CHECK_XREF, xref_outcome, &mut results, failing);

    for validator in validators {
        let outcome = validator.validate(artifact);
        record(artifact, validator.name(), outcome, &mut results, failing);
    }
    results
}

fn record(
    artifact: &Artifact,
    check: &str,
    outcome: GateOutcome,
    results: &mut Vec<QualityGateResult>,
    failing: &mut Vec<FailedCheck>,
) {
    if !outcome.pass {
        failing.push(FailedCheck {
            check: check.to_string(),
            artifact: artifact.name.clone(),
            diagnostics: outcome.diagnostics.clone(),
        });
    }
    results.push(QualityGateResult::new(artifact, check, outcome));
}
