//! Error types for the docflow orchestration core.
//!
//! Every error carries enough context (stage id, artifact name/version,
//! reference target) to be actionable without re-running the pipeline.

use thiserror::Error;

/// The main error type for docflow operations.
#[derive(Debug, Error)]
pub enum DocflowError {
    /// A dependency cycle was detected at registration.
    #[error("{0}")]
    Cycle(#[from] DependencyCycleError),

    /// A stage was dispatched without a committed input.
    #[error("{0}")]
    MissingInput(#[from] MissingInputError),

    /// A stage executor returned a failure.
    #[error("{0}")]
    StageExecution(#[from] StageExecutionError),

    /// A stage executor exceeded its configured timeout.
    #[error("{0}")]
    StageTimeout(#[from] StageTimeoutError),

    /// A pinned cross-reference cannot survive an automatic split.
    #[error("{0}")]
    SplitIntegrity(#[from] SplitIntegrityError),

    /// A cross-reference target could not be resolved.
    #[error("{0}")]
    UnresolvedReference(#[from] UnresolvedReferenceError),

    /// An artifact name or version was not found in the store.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// Invalid pipeline or splitter configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error raised when the stage graph contains a dependency cycle.
///
/// Fatal at registration time: the pipeline is rejected before any
/// execution side effects occur.
#[derive(Debug, Clone, Error)]
#[error("Dependency cycle in pipeline: {}", cycle_path.join(" -> "))]
pub struct DependencyCycleError {
    /// The stage ids forming the cycle, first stage repeated at the end.
    pub cycle_path: Vec<String>,
}

impl DependencyCycleError {
    /// Creates a new cycle error from the offending path.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}

/// Error raised when a stage is dispatched without a committed input.
///
/// The engine's readiness check prevents this during normal runs; it can
/// only surface through a forced dispatch.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' is missing a committed artifact of kind '{kind}'")]
pub struct MissingInputError {
    /// The stage that was dispatched.
    pub stage: String,
    /// The input kind with no committed artifact.
    pub kind: String,
}

impl MissingInputError {
    /// Creates a new missing-input error.
    #[must_use]
    pub fn new(stage: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            kind: kind.into(),
        }
    }
}

/// Error raised when a stage executor returns a failure.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed: {message}")]
pub struct StageExecutionError {
    /// The failed stage.
    pub stage: String,
    /// The executor's error message.
    pub message: String,
}

impl StageExecutionError {
    /// Creates a new stage execution error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a stage executor exceeds its configured timeout.
///
/// Treated by the engine as a stage execution failure.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' timed out after {timeout_secs}s")]
pub struct StageTimeoutError {
    /// The stage that overran.
    pub stage: String,
    /// The configured timeout in seconds.
    pub timeout_secs: u64,
}

impl StageTimeoutError {
    /// Creates a new timeout error.
    #[must_use]
    pub fn new(stage: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            stage: stage.into(),
            timeout_secs,
        }
    }
}

impl From<StageTimeoutError> for StageExecutionError {
    fn from(err: StageTimeoutError) -> Self {
        StageExecutionError::new(err.stage.clone(), err.to_string())
    }
}

/// Error raised when a proposed split would relocate a pinned reference.
///
/// The artifact is left unsplit and flagged for manual resolution; the
/// splitter pass continues for other artifacts.
#[derive(Debug, Clone, Error)]
#[error(
    "Split of '{artifact}' v{version} would move pinned target '{target}' \
     from part {pinned_part} to part {proposed_part}"
)]
pub struct SplitIntegrityError {
    /// The artifact that cannot be split.
    pub artifact: String,
    /// The artifact version the split was planned against.
    pub version: u64,
    /// The pinned reference target.
    pub target: String,
    /// The part the pin expects the target in.
    pub pinned_part: u32,
    /// The part the proposed split would place the target in.
    pub proposed_part: u32,
}

impl SplitIntegrityError {
    /// Creates a new split integrity error.
    #[must_use]
    pub fn new(
        artifact: impl Into<String>,
        version: u64,
        target: impl Into<String>,
        pinned_part: u32,
        proposed_part: u32,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            version,
            target: target.into(),
            pinned_part,
            proposed_part,
        }
    }
}

/// Error raised when a cross-reference target cannot be resolved.
///
/// Surfaced to the quality gate as a hard check failure, never silently
/// dropped.
#[derive(Debug, Clone, Error)]
#[error("Unresolved reference '{target}' in artifact '{artifact}'")]
pub struct UnresolvedReferenceError {
    /// The logical target that failed to resolve.
    pub target: String,
    /// The artifact containing the reference.
    pub artifact: String,
}

impl UnresolvedReferenceError {
    /// Creates a new unresolved-reference error.
    #[must_use]
    pub fn new(target: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            artifact: artifact.into(),
        }
    }
}

/// Error raised by the artifact store for an unknown name or version.
///
/// Callers cannot distinguish "not yet produced" from "misconfigured";
/// both surface as this error.
#[derive(Debug, Clone, Error)]
pub enum NotFoundError {
    /// No artifact exists under the given name.
    #[error("Artifact not found: '{name}'")]
    Name {
        /// The unknown artifact name.
        name: String,
    },

    /// The name exists but the requested version does not.
    #[error("Artifact '{name}' has no version {version}")]
    Version {
        /// The artifact name.
        name: String,
        /// The unknown version.
        version: u64,
    },
}

impl NotFoundError {
    /// Creates an unknown-name error.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name { name: name.into() }
    }

    /// Creates an unknown-version error.
    #[must_use]
    pub fn version(name: impl Into<String>, version: u64) -> Self {
        Self::Version {
            name: name.into(),
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_names_path() {
        let err = DependencyCycleError::new(vec![
            "draft".to_string(),
            "review".to_string(),
            "draft".to_string(),
        ]);
        assert!(err.to_string().contains("draft -> review -> draft"));
    }

    #[test]
    fn test_timeout_converts_to_execution_error() {
        let err: StageExecutionError = StageTimeoutError::new("compile", 30).into();
        assert_eq!(err.stage, "compile");
        assert!(err.message.contains("timed out after 30s"));
    }

    #[test]
    fn test_split_integrity_error_context() {
        let err = SplitIntegrityError::new("report", 3, "methods", 1, 2);
        let msg = err.to_string();
        assert!(msg.contains("report"));
        assert!(msg.contains("methods"));
        assert!(msg.contains("part 1"));
        assert!(msg.contains("part 2"));
    }

    #[test]
    fn test_not_found_variants() {
        assert!(NotFoundError::name("outline").to_string().contains("outline"));
        assert!(NotFoundError::version("outline", 7)
            .to_string()
            .contains("no version 7"));
    }

    #[test]
    fn test_umbrella_from_conversions() {
        let err: DocflowError = NotFoundError::name("x").into();
        assert!(matches!(err, DocflowError::NotFound(_)));

        let err: DocflowError = MissingInputError::new("s", "k").into();
        assert!(matches!(err, DocflowError::MissingInput(_)));
    }
}
