//! Pipeline and mapping definition files.
//!
//! Definitions are JSON documents: stages with their declared kinds and
//! executor commands, seed artifacts for external input kinds, pinned
//! reference targets, and the run configuration.

use crate::process::CommandExecutor;
use anyhow::{bail, Context, Result};
use docflow::config::PipelineConfig;
use docflow::core::StageSpec;
use docflow::engine::ExecutorRegistry;
use docflow::registry::StageRegistry;
use docflow::store::ArtifactStore;
use docflow::xref::{CrossReferenceIndex, RefLocation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One stage declaration in a pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDef {
    /// The stage id.
    pub id: String,
    /// Declared input artifact kinds.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Declared output artifact kinds.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// The executor command: program followed by its arguments.
    pub command: Vec<String>,
    /// Optional per-stage timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Whether the executor may be aborted mid-flight on cancellation.
    #[serde(default)]
    pub safely_abortable: bool,
    /// Scheduling-inert stage metadata.
    #[serde(default)]
    pub annotations: HashMap<String, serde_json::Value>,
}

/// A seed artifact committed before the run, for external input kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedDef {
    /// The artifact kind to commit under.
    pub kind: String,
    /// The file whose content seeds the artifact.
    pub file: PathBuf,
}

/// A pinned reference target cited by an out-of-pipeline document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinDef {
    /// The logical target.
    pub target: String,
    /// The artifact the citation points into.
    pub artifact: String,
    /// The cited part index (1 for an unsplit artifact).
    #[serde(default = "default_part")]
    pub part: u32,
}

fn default_part() -> u32 {
    1
}

/// A complete pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDef {
    /// The pipeline name.
    pub name: String,
    /// Run configuration.
    #[serde(default)]
    pub config: PipelineConfig,
    /// Directory holding persisted run state and artifacts.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Seed artifacts committed before the first run.
    #[serde(default)]
    pub seeds: Vec<SeedDef>,
    /// Pinned reference targets.
    #[serde(default)]
    pub pins: Vec<PinDef>,
    /// The stages.
    pub stages: Vec<StageDef>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".docflow")
}

impl PipelineDef {
    /// Loads a pipeline definition from a JSON file, applying environment
    /// overrides to its configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline definition {}", path.display()))?;
        let mut def: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing pipeline definition {}", path.display()))?;
        def.config.apply_env();
        def.config
            .validate()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("invalid pipeline configuration")?;
        if def.stages.is_empty() {
            bail!("pipeline '{}' declares no stages", def.name);
        }
        Ok(def)
    }

    /// Builds the stage registry from the declarations.
    pub fn registry(&self) -> Result<StageRegistry> {
        let mut registry = StageRegistry::new();
        for stage in &self.stages {
            let mut spec = StageSpec::new(&stage.id)
                .with_inputs(stage.inputs.iter().cloned())
                .with_outputs(stage.outputs.iter().cloned());
            if let Some(secs) = stage.timeout_secs {
                spec = spec.with_timeout_secs(secs);
            }
            if stage.safely_abortable {
                spec = spec.abortable();
            }
            for (key, value) in &stage.annotations {
                spec = spec.with_annotation(key.clone(), value.clone());
            }
            registry
                .register(spec)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
        }
        Ok(registry)
    }

    /// Builds the executor registry: one subprocess executor per stage.
    pub fn executors(&self) -> Result<ExecutorRegistry> {
        let mut executors = ExecutorRegistry::new();
        for stage in &self.stages {
            let Some((program, args)) = stage.command.split_first() else {
                bail!("stage '{}' declares an empty command", stage.id);
            };
            executors.register(
                &stage.id,
                Arc::new(CommandExecutor::new(program, args.to_vec())),
            );
        }
        Ok(executors)
    }

    /// Commits seed artifacts for kinds no stage produces. Kinds already
    /// present in the store (a resumed run) are left alone.
    pub fn apply_seeds(&self, store: &ArtifactStore) -> Result<()> {
        for seed in &self.seeds {
            if store.get(&seed.kind).is_ok() {
                continue;
            }
            let content = std::fs::read_to_string(&seed.file)
                .with_context(|| format!("reading seed file {}", seed.file.display()))?;
            store.put(&seed.kind, content);
        }
        Ok(())
    }

    /// Registers the pinned targets in the cross-reference index.
    pub fn apply_pins(&self, xref: &CrossReferenceIndex) {
        for pin in &self.pins {
            xref.pin(
                &pin.target,
                RefLocation::new(&pin.artifact, pin.part, &pin.target),
            );
        }
    }

    /// Path of the persisted run state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    /// Loads the persisted artifact store, or an empty one on first run.
    pub fn load_store(&self) -> Result<ArtifactStore> {
        if self.state_dir.join("artifacts.json").exists() {
            ArtifactStore::load_from_dir(&self.state_dir).map_err(|e| anyhow::anyhow!("{e}"))
        } else {
            Ok(ArtifactStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_def_json() -> serde_json::Value {
        serde_json::json!({
            "name": "report-pipeline",
            "config": { "workers": 2, "size_budget": 1200 },
            "stages": [
                {
                    "id": "outline",
                    "outputs": ["outline"],
                    "command": ["make-outline"]
                },
                {
                    "id": "draft",
                    "inputs": ["outline"],
                    "outputs": ["draft"],
                    "command": ["make-draft", "--long"],
                    "timeout_secs": 30,
                    "annotations": { "note": "slowest stage" }
                }
            ],
            "pins": [
                { "target": "methods", "artifact": "draft" }
            ]
        })
    }

    #[test]
    fn test_parse_and_build_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, sample_def_json().to_string()).unwrap();

        let def = PipelineDef::load(&path).unwrap();
        assert_eq!(def.name, "report-pipeline");
        assert_eq!(def.config.workers, 2);
        assert_eq!(def.state_dir, PathBuf::from(".docflow"));

        let registry = def.registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("draft").unwrap().timeout_secs, Some(30));
        assert_eq!(registry.resolve().unwrap(), vec!["outline", "draft"]);

        let executors = def.executors().unwrap();
        assert!(executors.get("outline").is_some());
    }

    #[test]
    fn test_pins_default_to_part_one() {
        let def: PipelineDef = serde_json::from_value(sample_def_json()).unwrap();
        assert_eq!(def.pins[0].part, 1);

        let xref = CrossReferenceIndex::new();
        def.apply_pins(&xref);
        let pinned = xref.pinned("methods").unwrap();
        assert_eq!(pinned.artifact, "draft");
        assert_eq!(pinned.part, 1);
    }

    #[test]
    fn test_empty_stage_list_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            serde_json::json!({ "name": "empty", "stages": [] }).to_string(),
        )
        .unwrap();
        assert!(PipelineDef::load(&path).is_err());
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut value = sample_def_json();
        value["stages"][0]["command"] = serde_json::json!([]);
        let def: PipelineDef = serde_json::from_value(value).unwrap();
        assert!(def.executors().is_err());
    }
}
