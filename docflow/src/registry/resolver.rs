//! Dependency resolver: topological ordering, cycle detection, ready set.

use super::StageRegistry;
use crate::core::StageStatus;
use crate::errors::DependencyCycleError;
use std::collections::{HashMap, HashSet};

impl StageRegistry {
    /// Checks the derived graph for cycles without producing an ordering.
    ///
    /// Called at registration-validation time, before any execution, so a
    /// cyclic pipeline is rejected before side effects occur.
    ///
    /// # Errors
    ///
    /// Returns `DependencyCycleError` naming the offending cycle.
    pub fn validate(&self) -> Result<(), DependencyCycleError> {
        self.resolve().map(|_| ())
    }

    /// Returns a topological ordering of the registered stages.
    ///
    /// Ordering ties are broken by registration sequence, keeping runs
    /// reproducible.
    ///
    /// # Errors
    ///
    /// Returns `DependencyCycleError` naming the offending cycle.
    pub fn resolve(&self) -> Result<Vec<String>, DependencyCycleError> {
        let stages = self.stages();
        let mut remaining: Vec<Option<HashSet<String>>> = stages
            .iter()
            .map(|s| Some(self.dependencies_of(&s.id)))
            .collect();

        let mut order = Vec::with_capacity(stages.len());
        while order.len() < stages.len() {
            // First registered stage with all dependencies placed wins.
            let next = (0..stages.len()).find(|&i| {
                remaining[i]
                    .as_ref()
                    .is_some_and(std::collections::HashSet::is_empty)
            });

            let Some(next) = next else {
                let cycle = self
                    .find_cycle()
                    .unwrap_or_else(|| vec!["<unknown>".to_string()]);
                return Err(DependencyCycleError::new(cycle));
            };

            let id = stages[next].id.clone();
            remaining[next] = None;
            for deps in remaining.iter_mut().flatten() {
                deps.remove(&id);
            }
            order.push(id);
        }
        Ok(order)
    }

    /// Returns the Pending stages whose every declared input kind has a
    /// committed artifact.
    ///
    /// Stages are returned in registration order.
    #[must_use]
    pub fn ready_set(
        &self,
        committed_kinds: &HashSet<String>,
        statuses: &HashMap<String, StageStatus>,
    ) -> Vec<String> {
        self.stages()
            .iter()
            .filter(|spec| {
                statuses
                    .get(&spec.id)
                    .copied()
                    .unwrap_or_default()
                    == StageStatus::Pending
            })
            .filter(|spec| spec.inputs.iter().all(|kind| committed_kinds.contains(kind)))
            .map(|spec| spec.id.clone())
            .collect()
    }

    /// Finds a dependency cycle, if one exists, as a path with the first
    /// stage repeated at the end.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }

        fn visit(
            registry: &StageRegistry,
            id: &str,
            marks: &mut HashMap<String, Mark>,
            stack: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            marks.insert(id.to_string(), Mark::Gray);
            stack.push(id.to_string());

            for dep in registry.dependencies_of(id) {
                match marks.get(&dep).copied().unwrap_or(Mark::White) {
                    Mark::Gray => {
                        // Reconstruct the loop from the gray stack.
                        let start = stack.iter().position(|s| *s == dep)?;
                        let mut cycle: Vec<String> = stack[start..].to_vec();
                        cycle.push(dep);
                        return Some(cycle);
                    }
                    Mark::White => {
                        if let Some(cycle) = visit(registry, &dep, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Black => {}
                }
            }

            stack.pop();
            marks.insert(id.to_string(), Mark::Black);
            None
        }

        let mut marks: HashMap<String, Mark> = HashMap::new();
        let mut stack = Vec::new();
        for spec in self.stages() {
            if marks.get(&spec.id).copied().unwrap_or(Mark::White) == Mark::White {
                if let Some(cycle) = visit(self, &spec.id, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageSpec;

    fn diamond_registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        registry
            .register(StageSpec::new("intake").with_output("brief"))
            .unwrap();
        registry
            .register(
                StageSpec::new("background")
                    .with_input("brief")
                    .with_output("background"),
            )
            .unwrap();
        registry
            .register(
                StageSpec::new("analysis")
                    .with_input("brief")
                    .with_output("analysis"),
            )
            .unwrap();
        registry
            .register(
                StageSpec::new("synthesis")
                    .with_inputs(["background", "analysis"])
                    .with_output("report"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_resolve_respects_dependencies() {
        let registry = diamond_registry();
        let order = registry.resolve().unwrap();

        let pos = |id: &str| order.iter().position(|s| s == id).unwrap();
        assert!(pos("intake") < pos("background"));
        assert!(pos("intake") < pos("analysis"));
        assert!(pos("background") < pos("synthesis"));
        assert!(pos("analysis") < pos("synthesis"));
    }

    #[test]
    fn test_resolve_tie_break_is_registration_order() {
        let registry = diamond_registry();
        let order = registry.resolve().unwrap();
        // background and analysis are unordered relative to each other;
        // registration sequence decides.
        assert_eq!(order, vec!["intake", "background", "analysis", "synthesis"]);

        let mut reversed = StageRegistry::new();
        reversed
            .register(StageSpec::new("b").with_output("b"))
            .unwrap();
        reversed
            .register(StageSpec::new("a").with_output("a"))
            .unwrap();
        assert_eq!(reversed.resolve().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_cycle_is_rejected_with_path() {
        let mut registry = StageRegistry::new();
        registry
            .register(
                StageSpec::new("draft")
                    .with_input("feedback")
                    .with_output("draft"),
            )
            .unwrap();
        registry
            .register(
                StageSpec::new("critique")
                    .with_input("draft")
                    .with_output("feedback"),
            )
            .unwrap();

        let err = registry.resolve().unwrap_err();
        assert_eq!(err.cycle_path.first(), err.cycle_path.last());
        assert!(err.cycle_path.contains(&"draft".to_string()));
        assert!(err.cycle_path.contains(&"critique".to_string()));
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_ready_set_requires_all_inputs() {
        let registry = diamond_registry();
        let statuses = HashMap::new();

        let mut committed = HashSet::new();
        // Nothing committed: only the stage with no inputs is ready.
        assert_eq!(registry.ready_set(&committed, &statuses), vec!["intake"]);

        committed.insert("brief".to_string());
        let ready = registry.ready_set(&committed, &statuses);
        assert!(ready.contains(&"background".to_string()));
        assert!(ready.contains(&"analysis".to_string()));
        assert!(!ready.contains(&"synthesis".to_string()));

        committed.insert("background".to_string());
        let ready = registry.ready_set(&committed, &statuses);
        assert!(!ready.contains(&"synthesis".to_string()));

        committed.insert("analysis".to_string());
        let ready = registry.ready_set(&committed, &statuses);
        assert!(ready.contains(&"synthesis".to_string()));
    }

    #[test]
    fn test_ready_set_skips_non_pending() {
        let registry = diamond_registry();
        let mut statuses = HashMap::new();
        statuses.insert("intake".to_string(), StageStatus::Complete);

        let committed = HashSet::new();
        assert!(registry.ready_set(&committed, &statuses).is_empty());
    }
}
