//! # Docflow
//!
//! A dependency-ordered content-pipeline orchestration core.
//!
//! Docflow coordinates pipelines of opaque content-producing stages:
//!
//! - **Stage registry & resolver**: stages declare input/output artifact
//!   kinds; the dependency DAG is derived, validated for cycles at
//!   registration, and topologically ordered with reproducible tie-breaks
//! - **Artifact store**: append-only, versioned, content-addressed storage;
//!   commits are the only cross-stage synchronization primitive
//! - **Execution engine**: bounded worker pool, per-stage status tracking,
//!   partial resume, cooperative cancellation, optional per-stage timeouts
//! - **Length monitor & splitter**: size-budget enforcement that splits
//!   oversized artifacts at structural boundaries while preserving every
//!   cross-reference
//! - **Compilation & quality gate**: declarative assembly with pluggable
//!   validators and a ready/conditional readiness report
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docflow::prelude::*;
//!
//! let mut registry = StageRegistry::new();
//! registry.register(StageSpec::new("outline").with_output("outline"))?;
//! registry.register(
//!     StageSpec::new("draft")
//!         .with_input("outline")
//!         .with_output("draft"),
//! )?;
//!
//! let engine = ExecutionEngine::new(PipelineConfig::default());
//! let report = engine.run(&registry, &executors, &store).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod assemble;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod engine;
pub mod errors;
pub mod events;
pub mod registry;
pub mod split;
pub mod store;
pub mod util;
pub mod xref;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::assemble::{
        assemble, run_gates, AssemblyMapping, AssemblyResult, FnValidator, GateOutcome,
        QualityGateResult, ReadinessReport, SectionMapping, SectionReadiness, Validator,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::PipelineConfig;
    pub use crate::core::{Artifact, StageSpec, StageStatus, TransitionEvent};
    pub use crate::engine::{
        ExecutionEngine, ExecutorInputs, ExecutorOutputs, ExecutorRegistry, FnExecutor,
        NoOpExecutor, RunReport, RunState, StageExecutor,
    };
    pub use crate::errors::{
        DependencyCycleError, DocflowError, MissingInputError, NotFoundError,
        SplitIntegrityError, StageExecutionError, StageTimeoutError, UnresolvedReferenceError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::registry::{DependencyEdge, StageRegistry};
    pub use crate::split::{SplitOutcome, SplitReport, Splitter};
    pub use crate::store::ArtifactStore;
    pub use crate::xref::{CrossReferenceIndex, RefLocation};
}
