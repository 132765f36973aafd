//! Execution engine.
//!
//! Drives stage execution against the resolver's schedule: repeatedly
//! computes the ready set, dispatches ready stages to their executors on a
//! bounded worker pool, and commits outputs to the artifact store. Artifact
//! commits are the only cross-stage synchronization primitive; a stage
//! never starts before every declared input exists at a committed version.

mod executor;
mod state;

pub use executor::{
    ExecutorInputs, ExecutorOutputs, ExecutorRegistry, FnExecutor, NoOpExecutor, StageExecutor,
    StaticExecutor,
};
pub use state::RunState;

use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{Artifact, StageStatus, TransitionEvent};
use crate::errors::{DocflowError, MissingInputError, StageExecutionError, StageTimeoutError};
use crate::events::{EventSink, NoOpEventSink};
use crate::registry::StageRegistry;
use crate::store::ArtifactStore;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// How a dispatched task ended.
enum TaskOutcome {
    Finished(Result<ExecutorOutputs, StageExecutionError>),
    Aborted,
}

/// The result of a pipeline run.
#[derive(Debug)]
pub struct RunReport {
    /// The final run state (statuses, artifact versions, audit log).
    pub state: RunState,
    /// Per-stage execution failures, in completion order.
    pub failures: Vec<StageExecutionError>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl RunReport {
    /// Returns the run identity.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.state.run_id
    }

    /// Returns true when every stage completed and the run was not
    /// cancelled.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.cancelled
            && self
                .state
                .statuses
                .values()
                .all(|s| *s == StageStatus::Complete)
    }
}

/// The execution engine.
pub struct ExecutionEngine {
    config: PipelineConfig,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ExecutionEngine {
    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            sink: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns a handle to the run's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Runs the pipeline from scratch.
    ///
    /// # Errors
    ///
    /// Returns `DependencyCycleError` before any side effects if the
    /// registry is cyclic; internal errors if the runtime fails.
    pub async fn run(
        &self,
        registry: &StageRegistry,
        executors: &ExecutorRegistry,
        store: &ArtifactStore,
    ) -> Result<RunReport, DocflowError> {
        registry.validate()?;
        let state = RunState::new(crate::util::generate_run_id());
        self.drive(registry, executors, store, state).await
    }

    /// Resumes a run from persisted state. Complete stages are not re-run;
    /// Failed, BlockedDownstream, and interrupted stages are re-evaluated.
    ///
    /// # Errors
    ///
    /// Returns `DependencyCycleError` if the registry is cyclic.
    pub async fn resume(
        &self,
        registry: &StageRegistry,
        executors: &ExecutorRegistry,
        store: &ArtifactStore,
        mut state: RunState,
    ) -> Result<RunReport, DocflowError> {
        registry.validate()?;
        state.prepare_resume();
        self.drive(registry, executors, store, state).await
    }

    /// Forcibly dispatches a single stage outside the readiness loop.
    ///
    /// # Errors
    ///
    /// Returns `MissingInputError` when a declared input has no committed
    /// artifact, or the executor's failure.
    pub async fn dispatch_stage(
        &self,
        registry: &StageRegistry,
        executors: &ExecutorRegistry,
        store: &ArtifactStore,
        stage_id: &str,
    ) -> Result<Vec<Artifact>, DocflowError> {
        let spec = registry
            .get(stage_id)
            .ok_or_else(|| DocflowError::Config(format!("unknown stage '{stage_id}'")))?;
        let executor = executors.get(stage_id).ok_or_else(|| {
            DocflowError::Config(format!("no executor registered for stage '{stage_id}'"))
        })?;

        let mut inputs = ExecutorInputs::new();
        for kind in &spec.inputs {
            let artifact = store
                .get(kind)
                .map_err(|_| MissingInputError::new(stage_id, kind.clone()))?;
            store.record_consumer(kind, stage_id);
            inputs.insert(kind.clone(), artifact);
        }

        let outputs = run_executor(executor, inputs, stage_id, effective_timeout(spec.timeout_secs, &self.config))
            .await
            .map_err(DocflowError::from)?;

        let mut committed = Vec::new();
        for kind in &spec.outputs {
            let content = outputs.get(kind).ok_or_else(|| {
                StageExecutionError::new(
                    stage_id,
                    format!("executor did not produce declared output '{kind}'"),
                )
            })?;
            committed.push(store.commit(kind, content.clone(), Some(stage_id.to_string())));
        }
        Ok(committed)
    }

    #[allow(clippy::too_many_lines)]
    async fn drive(
        &self,
        registry: &StageRegistry,
        executors: &ExecutorRegistry,
        store: &ArtifactStore,
        mut state: RunState,
    ) -> Result<RunReport, DocflowError> {
        let start = Instant::now();
        for spec in registry.stages() {
            state
                .statuses
                .entry(spec.id.clone())
                .or_insert(StageStatus::Pending);
        }
        self.sink.try_emit(
            "run.started",
            Some(serde_json::json!({ "run_id": state.run_id })),
        );

        let mut failures: Vec<StageExecutionError> = Vec::new();
        let mut active: FuturesUnordered<tokio::task::JoinHandle<(String, TaskOutcome)>> =
            FuturesUnordered::new();
        let mut abort_senders: HashMap<String, oneshot::Sender<()>> = HashMap::new();
        let mut abort_requested = false;

        loop {
            if self.cancel.is_cancelled() {
                if !abort_requested {
                    abort_requested = true;
                    // Safely-abortable in-flight stages are cut loose; the
                    // rest are allowed to finish.
                    for (stage, sender) in abort_senders.drain() {
                        let _ = sender.send(());
                        info!(stage = %stage, "abort requested for in-flight stage");
                    }
                }
            } else {
                let committed = store.committed_kinds();
                for id in registry.ready_set(&committed, &state.statuses) {
                    self.transition(&mut state, &id, StageStatus::Ready, Vec::new());
                }

                while active.len() < self.config.workers {
                    let next = registry
                        .stages()
                        .iter()
                        .find(|s| state.status_of(&s.id) == StageStatus::Ready)
                        .map(|s| s.id.clone());
                    let Some(id) = next else { break };

                    let Some(spec) = registry.get(&id).cloned() else {
                        break;
                    };
                    let Some(executor) = executors.get(&id) else {
                        self.transition(&mut state, &id, StageStatus::Failed, Vec::new());
                        let err = StageExecutionError::new(&id, "no executor registered");
                        warn!(stage = %id, "dispatch failed: no executor registered");
                        failures.push(err);
                        self.block_dependents(registry, &mut state, &id);
                        continue;
                    };

                    let mut inputs = ExecutorInputs::new();
                    let mut input_names = Vec::new();
                    for kind in &spec.inputs {
                        // Readiness guarantees presence; a race with
                        // archival would surface here as a failure.
                        match store.get(kind) {
                            Ok(artifact) => {
                                store.record_consumer(kind, &id);
                                input_names.push(artifact.name.clone());
                                inputs.insert(kind.clone(), artifact);
                            }
                            Err(err) => {
                                warn!(stage = %id, kind = %kind, "input vanished before dispatch");
                                failures.push(StageExecutionError::new(&id, err.to_string()));
                            }
                        }
                    }
                    if input_names.len() < spec.inputs.len() {
                        self.transition(&mut state, &id, StageStatus::Failed, Vec::new());
                        self.block_dependents(registry, &mut state, &id);
                        continue;
                    }

                    self.transition(&mut state, &id, StageStatus::Running, input_names);

                    let abort_rx = if spec.safely_abortable {
                        let (tx, rx) = oneshot::channel();
                        abort_senders.insert(id.clone(), tx);
                        Some(rx)
                    } else {
                        None
                    };
                    let timeout = effective_timeout(spec.timeout_secs, &self.config);
                    let stage_id = id.clone();
                    active.push(tokio::spawn(async move {
                        let work = run_executor(executor, inputs, &stage_id, timeout);
                        match abort_rx {
                            Some(mut rx) => tokio::select! {
                                _ = &mut rx => (stage_id.clone(), TaskOutcome::Aborted),
                                result = work => (stage_id.clone(), TaskOutcome::Finished(result)),
                            },
                            None => {
                                let result = work.await;
                                (stage_id.clone(), TaskOutcome::Finished(result))
                            }
                        }
                    }));
                }
            }

            if active.is_empty() {
                break;
            }

            let Some(joined) = active.next().await else {
                break;
            };
            let (id, outcome) = joined
                .map_err(|e| DocflowError::Internal(format!("stage task join error: {e}")))?;
            abort_senders.remove(&id);

            match outcome {
                TaskOutcome::Finished(Ok(outputs)) => {
                    self.commit_outputs(registry, store, &mut state, &mut failures, &id, &outputs);
                }
                TaskOutcome::Finished(Err(err)) => {
                    warn!(stage = %id, error = %err, "stage failed");
                    self.transition(&mut state, &id, StageStatus::Failed, Vec::new());
                    failures.push(err);
                    self.block_dependents(registry, &mut state, &id);
                }
                TaskOutcome::Aborted => {
                    // Left Pending for a later resume; not a failure.
                    self.transition(&mut state, &id, StageStatus::Pending, Vec::new());
                }
            }
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            self.sink.try_emit(
                "run.cancelled",
                Some(serde_json::json!({
                    "run_id": state.run_id,
                    "reason": self.cancel.reason(),
                })),
            );
        } else {
            self.sink.try_emit(
                "run.completed",
                Some(serde_json::json!({ "run_id": state.run_id })),
            );
        }

        Ok(RunReport {
            state,
            failures,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            cancelled,
        })
    }

    fn commit_outputs(
        &self,
        registry: &StageRegistry,
        store: &ArtifactStore,
        state: &mut RunState,
        failures: &mut Vec<StageExecutionError>,
        id: &str,
        outputs: &ExecutorOutputs,
    ) {
        let declared: Vec<String> = registry
            .get(id)
            .map(|s| s.outputs.clone())
            .unwrap_or_default();

        let mut committed_names = Vec::new();
        for kind in &declared {
            let Some(content) = outputs.get(kind) else {
                let err = StageExecutionError::new(
                    id,
                    format!("executor did not produce declared output '{kind}'"),
                );
                warn!(stage = %id, error = %err, "stage failed");
                self.transition(state, id, StageStatus::Failed, committed_names);
                failures.push(err);
                self.block_dependents(registry, state, id);
                return;
            };
            let artifact = store.commit(kind, content.clone(), Some(id.to_string()));
            state.record_artifact(&artifact.name, artifact.version);
            self.sink.try_emit(
                "artifact.committed",
                Some(serde_json::json!({
                    "artifact": artifact.name,
                    "version": artifact.version,
                    "stage": id,
                })),
            );
            committed_names.push(artifact.name);
        }
        self.transition(state, id, StageStatus::Complete, committed_names);
    }

    /// Marks every transitive dependent of a failed stage as blocked.
    /// Independent branches continue unaffected.
    fn block_dependents(&self, registry: &StageRegistry, state: &mut RunState, failed: &str) {
        for dependent in registry.dependents_of(failed) {
            if state.status_of(&dependent).is_schedulable() {
                self.transition(state, &dependent, StageStatus::BlockedDownstream, Vec::new());
            }
        }
    }

    fn transition(
        &self,
        state: &mut RunState,
        stage: &str,
        to: StageStatus,
        artifacts: Vec<String>,
    ) {
        let from = state.statuses.get(stage).copied();
        let event =
            TransitionEvent::new(&state.run_id, stage, from, to).with_artifacts(artifacts);
        info!(
            run_id = %state.run_id,
            stage = %stage,
            from = ?from,
            to = %to,
            artifacts = ?event.artifacts,
            timestamp = %event.timestamp,
            "stage transition"
        );
        self.sink.try_emit(event_name(to), Some(event.payload()));
        state.record(event);
    }
}

fn effective_timeout(stage_timeout: Option<u64>, config: &PipelineConfig) -> Option<u64> {
    stage_timeout.or(config.stage_timeout_secs)
}

fn event_name(to: StageStatus) -> &'static str {
    match to {
        StageStatus::Pending => "stage.requeued",
        StageStatus::Ready => "stage.ready",
        StageStatus::Running => "stage.started",
        StageStatus::Complete => "stage.completed",
        StageStatus::Failed => "stage.failed",
        StageStatus::BlockedDownstream => "stage.blocked",
    }
}

/// Runs an executor with the effective timeout, wrapping failures with the
/// stage id. A timeout converts into a stage execution failure.
async fn run_executor(
    executor: Arc<dyn StageExecutor>,
    inputs: ExecutorInputs,
    stage_id: &str,
    timeout_secs: Option<u64>,
) -> Result<ExecutorOutputs, StageExecutionError> {
    match timeout_secs {
        Some(secs) => {
            match tokio::time::timeout(Duration::from_secs(secs), executor.execute(inputs)).await
            {
                Ok(inner) => inner.map_err(|msg| StageExecutionError::new(stage_id, msg)),
                Err(_) => Err(StageTimeoutError::new(stage_id, secs).into()),
            }
        }
        None => executor
            .execute(inputs)
            .await
            .map_err(|msg| StageExecutionError::new(stage_id, msg)),
    }
}
