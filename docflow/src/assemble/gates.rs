//! Pluggable quality-gate validators.

use crate::core::Artifact;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// The outcome of one validator against one artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOutcome {
    /// Whether the check passed.
    pub pass: bool,
    /// Diagnostic messages, empty on a clean pass.
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

impl GateOutcome {
    /// A clean pass.
    #[must_use]
    pub fn passed() -> Self {
        Self {
            pass: true,
            diagnostics: Vec::new(),
        }
    }

    /// A failure with diagnostics.
    #[must_use]
    pub fn failed(diagnostics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            pass: false,
            diagnostics: diagnostics.into_iter().map(Into::into).collect(),
        }
    }
}

/// Trait for quality-gate validators.
///
/// Validators are external collaborators: the core records their verdicts
/// and never inspects their internals.
pub trait Validator: Send + Sync + Debug {
    /// The check name recorded in results.
    fn name(&self) -> &str;

    /// Validates one artifact.
    fn validate(&self, artifact: &Artifact) -> GateOutcome;
}

/// A function-based validator.
pub struct FnValidator<F>
where
    F: Fn(&Artifact) -> GateOutcome + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&Artifact) -> GateOutcome + Send + Sync,
{
    /// Creates a new function-based validator.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnValidator<F>
where
    F: Fn(&Artifact) -> GateOutcome + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnValidator").field("name", &self.name).finish()
    }
}

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Artifact) -> GateOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, artifact: &Artifact) -> GateOutcome {
        (self.func)(artifact)
    }
}

/// One recorded gate verdict. Never mutated, only appended per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateResult {
    /// The artifact that was checked.
    pub artifact: String,
    /// The artifact version that was checked.
    pub version: u64,
    /// The check name.
    pub check: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Diagnostic messages.
    #[serde(default)]
    pub diagnostics: Vec<String>,
    /// When the verdict was recorded (ISO 8601).
    pub recorded_at: String,
}

impl QualityGateResult {
    /// Records a verdict for an artifact and check.
    #[must_use]
    pub fn new(artifact: &Artifact, check: impl Into<String>, outcome: GateOutcome) -> Self {
        Self {
            artifact: artifact.name.clone(),
            version: artifact.version,
            check: check.into(),
            passed: outcome.pass,
            diagnostics: outcome.diagnostics,
            recorded_at: crate::util::iso_timestamp(),
        }
    }
}

/// Runs every validator against every artifact, appending one result per
/// (artifact, check) pair.
#[must_use]
pub fn run_gates(
    artifacts: &[Artifact],
    validators: &[Arc<dyn Validator>],
) -> Vec<QualityGateResult> {
    let mut results = Vec::with_capacity(artifacts.len() * validators.len());
    for artifact in artifacts {
        for validator in validators {
            let outcome = validator.validate(artifact);
            results.push(QualityGateResult::new(artifact, validator.name(), outcome));
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length_gate(max: usize) -> Arc<dyn Validator> {
        Arc::new(FnValidator::new("length", move |artifact: &Artifact| {
            if artifact.line_count <= max {
                GateOutcome::passed()
            } else {
                GateOutcome::failed([format!(
                    "{} lines exceeds limit of {max}",
                    artifact.line_count
                )])
            }
        }))
    }

    #[test]
    fn test_run_gates_records_per_pair() {
        let artifacts = vec![
            Artifact::new("short", 1, "one line", None),
            Artifact::new("long", 1, "a\nb\nc", None),
        ];
        let validators = vec![length_gate(2)];

        let results = run_gates(&artifacts, &validators);

        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert_eq!(results[1].check, "length");
        assert!(results[1].diagnostics[0].contains("exceeds limit"));
    }

    #[test]
    fn test_gate_outcome_constructors() {
        assert!(GateOutcome::passed().pass);
        let failed = GateOutcome::failed(["broken"]);
        assert!(!failed.pass);
        assert_eq!(failed.diagnostics, vec!["broken"]);
    }
}
