//! Stage registry: static declaration of stages and their artifact kinds.
//!
//! The dependency graph is derived from declared input/output kinds, so
//! ordering is a resolver output rather than a hand-authored sequence.

mod resolver;

use crate::core::StageSpec;
use crate::errors::DocflowError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// A derived dependency edge between two stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The stage producing the artifact kind.
    pub producer: String,
    /// The stage consuming it.
    pub consumer: String,
    /// The artifact kind carried along the edge.
    pub kind: String,
}

/// Registry of stage specifications, kept in registration order.
///
/// Registration order is the tie-break for topological ordering ties,
/// keeping runs reproducible.
#[derive(Debug, Default, Clone)]
pub struct StageRegistry {
    stages: Vec<StageSpec>,
    index: HashMap<String, usize>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec is invalid or the id is already
    /// registered.
    pub fn register(&mut self, spec: StageSpec) -> Result<(), DocflowError> {
        spec.validate()?;
        if self.index.contains_key(&spec.id) {
            return Err(DocflowError::Config(format!(
                "stage '{}' is already registered",
                spec.id
            )));
        }
        self.index.insert(spec.id.clone(), self.stages.len());
        self.stages.push(spec);
        Ok(())
    }

    /// Looks up a stage by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&StageSpec> {
        self.index.get(id).map(|&i| &self.stages[i])
    }

    /// Returns all stages in registration order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if no stages are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the stages declaring `kind` as an output, in registration
    /// order.
    #[must_use]
    pub fn producers_of(&self, kind: &str) -> Vec<&StageSpec> {
        self.stages
            .iter()
            .filter(|s| s.outputs.iter().any(|k| k == kind))
            .collect()
    }

    /// Derives the dependency edges from declared kinds.
    ///
    /// Input kinds with no registered producer are pipeline inputs seeded
    /// externally; they contribute no edge.
    #[must_use]
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges = Vec::new();
        for consumer in &self.stages {
            for kind in &consumer.inputs {
                for producer in self.producers_of(kind) {
                    edges.push(DependencyEdge {
                        producer: producer.id.clone(),
                        consumer: consumer.id.clone(),
                        kind: kind.clone(),
                    });
                }
            }
        }
        edges
    }

    /// Returns the ids of the direct upstream producers of a stage.
    #[must_use]
    pub fn dependencies_of(&self, id: &str) -> HashSet<String> {
        let Some(spec) = self.get(id) else {
            return HashSet::new();
        };
        spec.inputs
            .iter()
            .flat_map(|kind| self.producers_of(kind))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Returns the ids of every stage transitively depending on `id`.
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> HashSet<String> {
        let mut downstream: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in self.edges() {
            let producer = self.stages[self.index[&edge.producer]].id.as_str();
            let consumer = self.stages[self.index[&edge.consumer]].id.as_str();
            downstream.entry(producer).or_default().push(consumer);
        }

        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            for &next in downstream.get(current).map_or(&[][..], Vec::as_slice) {
                if seen.insert(next.to_string()) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }
}
