//! Persisted pipeline run state.
//!
//! Stage statuses and artifact versions are persisted after every
//! transition batch so `resume` can restart a run without re-running
//! completed stages.

use crate::core::{StageStatus, TransitionEvent};
use crate::errors::DocflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// The persisted state of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// The run identity.
    pub run_id: String,
    /// Current status per stage id.
    #[serde(default)]
    pub statuses: HashMap<String, StageStatus>,
    /// Latest committed version per artifact name.
    #[serde(default)]
    pub artifact_versions: HashMap<String, u64>,
    /// The ordered transition audit log.
    #[serde(default)]
    pub transitions: Vec<TransitionEvent>,
    /// Last update time (ISO 8601).
    pub updated_at: String,
}

impl RunState {
    /// Creates a fresh state for a run.
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            statuses: HashMap::new(),
            artifact_versions: HashMap::new(),
            transitions: Vec::new(),
            updated_at: crate::util::iso_timestamp(),
        }
    }

    /// Applies a transition: updates the stage status and appends to the
    /// audit log.
    pub fn record(&mut self, event: TransitionEvent) {
        self.statuses.insert(event.stage.clone(), event.to);
        self.updated_at = event.timestamp.clone();
        self.transitions.push(event);
    }

    /// Records the latest committed version of an artifact.
    pub fn record_artifact(&mut self, name: impl Into<String>, version: u64) {
        self.artifact_versions.insert(name.into(), version);
    }

    /// Returns the status of a stage, Pending when never recorded.
    #[must_use]
    pub fn status_of(&self, stage: &str) -> StageStatus {
        self.statuses.get(stage).copied().unwrap_or_default()
    }

    /// Resets non-terminal and failed work for a resumed run: Failed,
    /// BlockedDownstream, and interrupted Ready/Running stages become
    /// Pending again; Complete stages are left alone.
    pub fn prepare_resume(&mut self) {
        for status in self.statuses.values_mut() {
            if *status != StageStatus::Complete {
                *status = StageStatus::Pending;
            }
        }
        self.updated_at = crate::util::iso_timestamp();
    }

    /// Serializes the state to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DocflowError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads a state previously written by `save`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocflowError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
