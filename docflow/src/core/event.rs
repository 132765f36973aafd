//! Stage transition audit records.

use crate::core::StageStatus;
use serde::{Deserialize, Serialize};

/// A single stage status transition.
///
/// Every transition the engine makes is recorded with the stage id, the
/// artifact names touched, and a timestamp, so runs are auditable and
/// resumable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// The run this transition belongs to.
    pub run_id: String,
    /// The stage whose status changed.
    pub stage: String,
    /// The previous status, absent for the initial Pending record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<StageStatus>,
    /// The new status.
    pub to: StageStatus,
    /// Artifact names committed or read as part of the transition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    /// When the transition happened (ISO 8601).
    pub timestamp: String,
}

impl TransitionEvent {
    /// Creates a new transition record stamped with the current time.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        stage: impl Into<String>,
        from: Option<StageStatus>,
        to: StageStatus,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            stage: stage.into(),
            from,
            to,
            artifacts: Vec::new(),
            timestamp: crate::util::iso_timestamp(),
        }
    }

    /// Attaches the artifact names touched by this transition.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Returns the event as a JSON payload for an event sink.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id,
            "stage": self.stage,
            "from": self.from,
            "to": self.to,
            "artifacts": self.artifacts,
            "timestamp": self.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_payload() {
        let event = TransitionEvent::new(
            "run-1",
            "draft",
            Some(StageStatus::Running),
            StageStatus::Complete,
        )
        .with_artifacts(vec!["draft".to_string()]);

        let payload = event.payload();
        assert_eq!(payload["stage"], "draft");
        assert_eq!(payload["to"], "complete");
        assert_eq!(payload["artifacts"][0], "draft");
    }

    #[test]
    fn test_transition_serde_roundtrip() {
        let event = TransitionEvent::new("run-2", "review", None, StageStatus::Pending);
        let json = serde_json::to_string(&event).unwrap();
        let back: TransitionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stage, "review");
        assert!(back.from.is_none());
        assert_eq!(back.to, StageStatus::Pending);
    }
}
