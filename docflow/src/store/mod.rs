//! Content-addressed, versioned artifact storage.
//!
//! Writes are append-only: a new version per commit, never an overwrite.
//! Reads observe the latest committed version at call time. Writes are
//! serialized per artifact name through the map's entry guard, so two
//! stages never race to create the same version.

use crate::core::Artifact;
use crate::errors::{DocflowError, NotFoundError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredVersion {
    artifact: Artifact,
    archived: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ArtifactRecord {
    versions: Vec<StoredVersion>,
    #[serde(default)]
    consumers: HashSet<String>,
}

/// The versioned artifact store.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    records: DashMap<String, ArtifactRecord>,
}

impl ArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits content under a name, returning the new version number.
    ///
    /// Versions are monotonically increasing per name, starting at 1.
    pub fn put(&self, name: &str, content: impl Into<String>) -> u64 {
        self.commit(name, content, None).version
    }

    /// Commits content with its producing stage, returning the committed
    /// snapshot.
    pub fn commit(
        &self,
        name: &str,
        content: impl Into<String>,
        produced_by: Option<String>,
    ) -> Artifact {
        let mut record = self.records.entry(name.to_string()).or_default();
        let version = record.versions.len() as u64 + 1;
        let artifact = Artifact::new(name, version, content, produced_by);
        record.versions.push(StoredVersion {
            artifact: artifact.clone(),
            archived: false,
        });
        artifact
    }

    /// Returns the latest non-archived version under a name.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` for an unknown name or when every version
    /// has been archived. Callers cannot distinguish "not yet produced"
    /// from "misconfigured".
    pub fn get(&self, name: &str) -> Result<Artifact, NotFoundError> {
        let record = self
            .records
            .get(name)
            .ok_or_else(|| NotFoundError::name(name))?;
        record
            .versions
            .iter()
            .rev()
            .find(|v| !v.archived)
            .map(|v| v.artifact.clone())
            .ok_or_else(|| NotFoundError::name(name))
    }

    /// Returns a specific version, archived or not.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` for an unknown name or version.
    pub fn get_version(&self, name: &str, version: u64) -> Result<Artifact, NotFoundError> {
        let record = self
            .records
            .get(name)
            .ok_or_else(|| NotFoundError::name(name))?;
        let index = version
            .checked_sub(1)
            .ok_or_else(|| NotFoundError::version(name, version))? as usize;
        record
            .versions
            .get(index)
            .map(|v| v.artifact.clone())
            .ok_or_else(|| NotFoundError::version(name, version))
    }

    /// Returns the ordered version numbers committed under a name.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` for an unknown name.
    pub fn versions(&self, name: &str) -> Result<Vec<u64>, NotFoundError> {
        let record = self
            .records
            .get(name)
            .ok_or_else(|| NotFoundError::name(name))?;
        Ok(record.versions.iter().map(|v| v.artifact.version).collect())
    }

    /// Archives a version. Archived versions are hidden from `get` but
    /// remain readable through `get_version`; nothing is ever deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` for an unknown name or version.
    pub fn archive(&self, name: &str, version: u64) -> Result<(), NotFoundError> {
        let mut record = self
            .records
            .get_mut(name)
            .ok_or_else(|| NotFoundError::name(name))?;
        let index = version
            .checked_sub(1)
            .ok_or_else(|| NotFoundError::version(name, version))? as usize;
        let stored = record
            .versions
            .get_mut(index)
            .ok_or_else(|| NotFoundError::version(name, version))?;
        stored.archived = true;
        Ok(())
    }

    /// Returns whether a version is archived.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` for an unknown name or version.
    pub fn is_archived(&self, name: &str, version: u64) -> Result<bool, NotFoundError> {
        let record = self
            .records
            .get(name)
            .ok_or_else(|| NotFoundError::name(name))?;
        let index = version
            .checked_sub(1)
            .ok_or_else(|| NotFoundError::version(name, version))? as usize;
        record
            .versions
            .get(index)
            .map(|v| v.archived)
            .ok_or_else(|| NotFoundError::version(name, version))
    }

    /// Records a stage as a consumer of an artifact name.
    pub fn record_consumer(&self, name: &str, stage_id: &str) {
        self.records
            .entry(name.to_string())
            .or_default()
            .consumers
            .insert(stage_id.to_string());
    }

    /// Returns the recorded consumer stages of an artifact name.
    #[must_use]
    pub fn consumers(&self, name: &str) -> HashSet<String> {
        self.records
            .get(name)
            .map(|r| r.consumers.clone())
            .unwrap_or_default()
    }

    /// Returns all artifact names with at least one non-archived version,
    /// sorted for deterministic iteration.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.value().versions.iter().any(|v| !v.archived))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Returns the set of kinds with a committed, non-archived artifact.
    #[must_use]
    pub fn committed_kinds(&self) -> HashSet<String> {
        self.names().into_iter().collect()
    }

    /// Persists the store as `artifacts.json` under a state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or written.
    pub fn save_to_dir(&self, dir: impl AsRef<Path>) -> Result<(), DocflowError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let snapshot: BTreeMap<String, ArtifactRecord> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(dir.join("artifacts.json"), json)?;
        Ok(())
    }

    /// Loads a store previously written by `save_to_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, DocflowError> {
        let raw = std::fs::read_to_string(dir.as_ref().join("artifacts.json"))?;
        let snapshot: BTreeMap<String, ArtifactRecord> = serde_json::from_str(&raw)?;
        let store = Self::new();
        for (name, record) in snapshot {
            store.records.insert(name, record);
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_put_is_append_only() {
        let store = ArtifactStore::new();
        assert_eq!(store.put("outline", "v1"), 1);
        assert_eq!(store.put("outline", "v2"), 2);
        assert_eq!(store.put("outline", "v3"), 3);

        assert_eq!(store.versions("outline").unwrap(), vec![1, 2, 3]);
        assert_eq!(store.get("outline").unwrap().content, "v3");
        assert_eq!(store.get_version("outline", 1).unwrap().content, "v1");
    }

    #[test]
    fn test_get_unknown_name() {
        let store = ArtifactStore::new();
        assert!(matches!(
            store.get("missing"),
            Err(NotFoundError::Name { .. })
        ));
        assert!(store.versions("missing").is_err());
    }

    #[test]
    fn test_get_unknown_version() {
        let store = ArtifactStore::new();
        store.put("outline", "v1");
        assert!(matches!(
            store.get_version("outline", 9),
            Err(NotFoundError::Version { version: 9, .. })
        ));
        assert!(store.get_version("outline", 0).is_err());
    }

    #[test]
    fn test_archive_hides_from_latest() {
        let store = ArtifactStore::new();
        store.put("report", "full");
        store.archive("report", 1).unwrap();

        // Archived, not deleted: history still reads.
        assert!(store.get("report").is_err());
        assert_eq!(store.get_version("report", 1).unwrap().content, "full");
        assert!(store.is_archived("report", 1).unwrap());

        // A replacement commit becomes the new latest.
        store.put("report", "index");
        assert_eq!(store.get("report").unwrap().content, "index");
        assert!(!store.names().is_empty());
    }

    #[test]
    fn test_commit_records_producer() {
        let store = ArtifactStore::new();
        let artifact = store.commit("draft", "text", Some("writer".to_string()));
        assert_eq!(artifact.produced_by.as_deref(), Some("writer"));

        store.record_consumer("draft", "reviewer");
        assert!(store.consumers("draft").contains("reviewer"));
    }

    #[test]
    fn test_committed_kinds() {
        let store = ArtifactStore::new();
        store.put("outline", "x");
        store.put("draft", "y");
        store.archive("draft", 1).unwrap();

        let kinds = store.committed_kinds();
        assert!(kinds.contains("outline"));
        assert!(!kinds.contains("draft"));
    }

    #[test]
    fn test_concurrent_puts_never_share_a_version() {
        let store = std::sync::Arc::new(ArtifactStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.put("shared", format!("writer-{i}"))
            }));
        }
        let mut versions: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=8).collect::<Vec<u64>>());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new();
        store.commit("outline", "content", Some("planner".to_string()));
        store.put("outline", "content v2");
        store.archive("outline", 1).unwrap();
        store.record_consumer("outline", "writer");

        store.save_to_dir(dir.path()).unwrap();
        let loaded = ArtifactStore::load_from_dir(dir.path()).unwrap();

        assert_eq!(loaded.versions("outline").unwrap(), vec![1, 2]);
        assert_eq!(loaded.get("outline").unwrap().content, "content v2");
        assert!(loaded.is_archived("outline", 1).unwrap());
        assert!(loaded.consumers("outline").contains("writer"));
    }
}
