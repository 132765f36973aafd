//! Pipeline configuration.
//!
//! Loaded from a JSON document, with `DOCFLOW_*` environment variables
//! taking precedence over file values.

use crate::errors::DocflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default per-artifact size budget, in lines.
pub const DEFAULT_SIZE_BUDGET: usize = 1500;

/// Default small-remainder merge threshold, as a fraction of the budget.
pub const DEFAULT_MERGE_THRESHOLD: f64 = 0.10;

/// Default worker-pool size.
pub const DEFAULT_WORKERS: usize = 4;

/// Configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of stages executing concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Size budget applied to artifact kinds without a class override.
    #[serde(default = "default_size_budget")]
    pub size_budget: usize,
    /// Per-artifact-class budget overrides, keyed by kind.
    #[serde(default)]
    pub class_budgets: HashMap<String, usize>,
    /// A final split part smaller than this fraction of the budget is
    /// merged into its predecessor when the merged part still fits.
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f64,
    /// Default per-stage timeout in seconds; stages may override. No
    /// timeout is imposed when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timeout_secs: Option<u64>,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_size_budget() -> usize {
    DEFAULT_SIZE_BUDGET
}

fn default_merge_threshold() -> f64 {
    DEFAULT_MERGE_THRESHOLD
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            size_budget: DEFAULT_SIZE_BUDGET,
            class_budgets: HashMap::new(),
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            stage_timeout_secs: None,
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from a JSON file and applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocflowError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Applies `DOCFLOW_WORKERS`, `DOCFLOW_BUDGET`, and
    /// `DOCFLOW_MERGE_THRESHOLD` overrides from the environment.
    pub fn apply_env(&mut self) {
        if let Some(workers) = env_parse::<usize>("DOCFLOW_WORKERS") {
            self.workers = workers;
        }
        if let Some(budget) = env_parse::<usize>("DOCFLOW_BUDGET") {
            self.size_budget = budget;
        }
        if let Some(threshold) = env_parse::<f64>("DOCFLOW_MERGE_THRESHOLD") {
            self.merge_threshold = threshold;
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero worker pool, a zero budget, or a merge
    /// threshold outside `(0, 1)`.
    pub fn validate(&self) -> Result<(), DocflowError> {
        if self.workers == 0 {
            return Err(DocflowError::Config(
                "worker pool size must be at least 1".to_string(),
            ));
        }
        if self.size_budget == 0 {
            return Err(DocflowError::Config(
                "size budget must be at least 1".to_string(),
            ));
        }
        if let Some((kind, _)) = self.class_budgets.iter().find(|(_, b)| **b == 0) {
            return Err(DocflowError::Config(format!(
                "size budget for class '{kind}' must be at least 1"
            )));
        }
        if !(self.merge_threshold > 0.0 && self.merge_threshold < 1.0) {
            return Err(DocflowError::Config(format!(
                "merge threshold must be between 0 and 1, got {}",
                self.merge_threshold
            )));
        }
        Ok(())
    }

    /// Sets the worker-pool size.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the default size budget.
    #[must_use]
    pub fn with_size_budget(mut self, budget: usize) -> Self {
        self.size_budget = budget;
        self
    }

    /// Sets a per-class budget override.
    #[must_use]
    pub fn with_class_budget(mut self, kind: impl Into<String>, budget: usize) -> Self {
        self.class_budgets.insert(kind.into(), budget);
        self
    }

    /// Sets the small-remainder merge threshold.
    #[must_use]
    pub fn with_merge_threshold(mut self, threshold: f64) -> Self {
        self.merge_threshold = threshold;
        self
    }

    /// Sets the default per-stage timeout.
    #[must_use]
    pub fn with_stage_timeout_secs(mut self, secs: u64) -> Self {
        self.stage_timeout_secs = Some(secs);
        self
    }

    /// Returns the budget for an artifact of the given kind.
    #[must_use]
    pub fn budget_for(&self, kind: &str) -> usize {
        self.class_budgets
            .get(kind)
            .copied()
            .unwrap_or(self.size_budget)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.size_budget, DEFAULT_SIZE_BUDGET);
        assert!((config.merge_threshold - 0.10).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_class_budget_override() {
        let config = PipelineConfig::default()
            .with_size_budget(2000)
            .with_class_budget("appendix", 800);

        assert_eq!(config.budget_for("appendix"), 800);
        assert_eq!(config.budget_for("chapter"), 2000);
    }

    #[test]
    fn test_invalid_merge_threshold() {
        let config = PipelineConfig::default().with_merge_threshold(1.5);
        assert!(config.validate().is_err());

        let config = PipelineConfig::default().with_merge_threshold(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_workers() {
        let config = PipelineConfig::default().with_workers(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = PipelineConfig::default()
            .with_workers(8)
            .with_class_budget("chapter", 1200)
            .with_stage_timeout_secs(60);

        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.workers, 8);
        assert_eq!(back.budget_for("chapter"), 1200);
        assert_eq!(back.stage_timeout_secs, Some(60));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let back: PipelineConfig = serde_json::from_str(r#"{"workers": 2}"#).unwrap();
        assert_eq!(back.workers, 2);
        assert_eq!(back.size_budget, DEFAULT_SIZE_BUDGET);
    }
}
