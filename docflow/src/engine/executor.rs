//! Stage executor trait and implementations.
//!
//! Executors are opaque external collaborators reached through a narrow
//! interface: named inputs in, named outputs or an error out. The core
//! never inspects their internals.

use crate::core::Artifact;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Named inputs passed to an executor: artifact kind to committed snapshot.
pub type ExecutorInputs = HashMap<String, Artifact>;

/// Named outputs returned by an executor: artifact kind to content.
pub type ExecutorOutputs = HashMap<String, String>;

/// Trait for stage executors.
#[async_trait]
pub trait StageExecutor: Send + Sync + Debug {
    /// Executes the stage against its named inputs.
    ///
    /// # Errors
    ///
    /// Returns the executor's own failure description; the engine wraps it
    /// with the stage id.
    async fn execute(&self, inputs: ExecutorInputs) -> Result<ExecutorOutputs, String>;
}

/// A synchronous function-based executor.
pub struct FnExecutor<F>
where
    F: Fn(ExecutorInputs) -> Result<ExecutorOutputs, String> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(ExecutorInputs) -> Result<ExecutorOutputs, String> + Send + Sync,
{
    /// Creates a new function-based executor.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnExecutor<F>
where
    F: Fn(ExecutorInputs) -> Result<ExecutorOutputs, String> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> StageExecutor for FnExecutor<F>
where
    F: Fn(ExecutorInputs) -> Result<ExecutorOutputs, String> + Send + Sync,
{
    async fn execute(&self, inputs: ExecutorInputs) -> Result<ExecutorOutputs, String> {
        (self.func)(inputs)
    }
}

/// An executor that produces empty content for each declared kind. For
/// wiring tests and dry runs.
#[derive(Debug, Clone)]
pub struct NoOpExecutor {
    outputs: Vec<String>,
}

impl NoOpExecutor {
    /// Creates a no-op executor producing the given kinds.
    #[must_use]
    pub fn new(outputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl StageExecutor for NoOpExecutor {
    async fn execute(&self, _inputs: ExecutorInputs) -> Result<ExecutorOutputs, String> {
        Ok(self
            .outputs
            .iter()
            .map(|kind| (kind.clone(), String::new()))
            .collect())
    }
}

/// An executor returning fixed content per kind. For tests.
#[derive(Debug, Clone, Default)]
pub struct StaticExecutor {
    outputs: ExecutorOutputs,
}

impl StaticExecutor {
    /// Creates an empty static executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixed output.
    #[must_use]
    pub fn with_output(mut self, kind: impl Into<String>, content: impl Into<String>) -> Self {
        self.outputs.insert(kind.into(), content.into());
        self
    }
}

#[async_trait]
impl StageExecutor for StaticExecutor {
    async fn execute(&self, _inputs: ExecutorInputs) -> Result<ExecutorOutputs, String> {
        Ok(self.outputs.clone())
    }
}

/// Registry mapping stage ids to their executors.
#[derive(Debug, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StageExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the executor for a stage id, replacing any previous one.
    pub fn register(&mut self, stage_id: impl Into<String>, executor: Arc<dyn StageExecutor>) {
        self.executors.insert(stage_id.into(), executor);
    }

    /// Looks up the executor for a stage.
    #[must_use]
    pub fn get(&self, stage_id: &str) -> Option<Arc<dyn StageExecutor>> {
        self.executors.get(stage_id).cloned()
    }
}
