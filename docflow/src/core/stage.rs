//! Stage specification and status.

use crate::errors::DocflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The execution status of a stage.
///
/// Mutated only by the execution engine. `Failed` propagates
/// `BlockedDownstream` to every transitive dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Waiting for declared inputs to be committed.
    Pending,
    /// All declared inputs are committed; eligible for dispatch.
    Ready,
    /// Dispatched to an executor.
    Running,
    /// Executor returned successfully and outputs are committed.
    Complete,
    /// Executor returned an error or timed out.
    Failed,
    /// A transitive dependency failed; this stage will not run.
    BlockedDownstream,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::BlockedDownstream => write!(f, "blocked_downstream"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::BlockedDownstream)
    }

    /// Returns true if the stage may still be dispatched this run.
    #[must_use]
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Self::Pending | Self::Ready)
    }
}

/// Specification for a single stage in a pipeline.
///
/// Declares the artifact kinds the stage consumes and produces; the
/// dependency graph is derived from these declarations, never hand-authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// The unique stage id.
    pub id: String,
    /// Ordered list of declared input artifact kinds.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Declared output artifact kinds.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Optional per-stage timeout in seconds; an overrun fails the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Whether the engine may abort the executor mid-flight on cancellation.
    #[serde(default)]
    pub safely_abortable: bool,
    /// Stage-local narrative metadata. Never consulted by the resolver or
    /// the quality gates.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, serde_json::Value>,
}

impl StageSpec {
    /// Creates a new stage specification with no declared kinds.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            timeout_secs: None,
            safely_abortable: false,
            annotations: HashMap::new(),
        }
    }

    /// Appends a declared input kind.
    #[must_use]
    pub fn with_input(mut self, kind: impl Into<String>) -> Self {
        self.inputs.push(kind.into());
        self
    }

    /// Appends several declared input kinds in order.
    #[must_use]
    pub fn with_inputs(mut self, kinds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs.extend(kinds.into_iter().map(Into::into));
        self
    }

    /// Appends a declared output kind.
    #[must_use]
    pub fn with_output(mut self, kind: impl Into<String>) -> Self {
        self.outputs.push(kind.into());
        self
    }

    /// Appends several declared output kinds.
    #[must_use]
    pub fn with_outputs(mut self, kinds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.outputs.extend(kinds.into_iter().map(Into::into));
        self
    }

    /// Sets the per-stage timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Marks the executor as safe to abort mid-flight.
    #[must_use]
    pub fn abortable(mut self) -> Self {
        self.safely_abortable = true;
        self
    }

    /// Attaches a scheduling-inert annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.annotations.insert(key.into(), value);
        self
    }

    /// Validates the specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or the stage consumes a kind it
    /// also produces (a self-loop).
    pub fn validate(&self) -> Result<(), DocflowError> {
        if self.id.trim().is_empty() {
            return Err(DocflowError::Config(
                "stage id cannot be empty or whitespace-only".to_string(),
            ));
        }
        if let Some(kind) = self.inputs.iter().find(|k| self.outputs.contains(k)) {
            return Err(DocflowError::Config(format!(
                "stage '{}' both consumes and produces kind '{kind}'",
                self.id
            )));
        }
        Ok(())
    }
}
