//! Committed artifact snapshot.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A committed, immutable artifact version.
///
/// Regeneration appends a new version under the same logical name; the
/// content of an existing version never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// The logical artifact name.
    pub name: String,
    /// The version, monotonically increasing per name starting at 1.
    pub version: u64,
    /// The artifact content.
    pub content: String,
    /// Size in lines, the unit size budgets are expressed in.
    pub line_count: usize,
    /// Size in bytes, recorded for diagnostics.
    pub byte_count: usize,
    /// Hex-encoded SHA-256 of the content.
    pub content_hash: String,
    /// The stage that committed this version, if produced by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_by: Option<String>,
    /// Commit time (ISO 8601).
    pub committed_at: String,
}

impl Artifact {
    /// Creates a committed artifact snapshot, computing sizes and hash.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: u64,
        content: impl Into<String>,
        produced_by: Option<String>,
    ) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            version,
            line_count: count_lines(&content),
            byte_count: content.len(),
            content_hash: content_hash(&content),
            produced_by,
            committed_at: crate::util::iso_timestamp(),
            content,
        }
    }

    /// Returns the size in the budget unit (lines).
    #[must_use]
    pub fn size(&self) -> usize {
        self.line_count
    }
}

/// Computes the hex-encoded SHA-256 hash of content.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn count_lines(content: &str) -> usize {
    if content.is_empty() {
        0
    } else {
        content.lines().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_sizes() {
        let artifact = Artifact::new("outline", 1, "a\nb\nc", None);
        assert_eq!(artifact.line_count, 3);
        assert_eq!(artifact.byte_count, 5);
        assert_eq!(artifact.size(), 3);
    }

    #[test]
    fn test_empty_content() {
        let artifact = Artifact::new("empty", 1, "", None);
        assert_eq!(artifact.line_count, 0);
        assert_eq!(artifact.byte_count, 0);
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }

    #[test]
    fn test_artifact_serialization() {
        let artifact = Artifact::new("draft", 2, "hello", Some("writer".to_string()));
        let json = serde_json::to_string(&artifact).unwrap();
        let back: Artifact = serde_json::from_str(&json).unwrap();

        assert_eq!(back.name, "draft");
        assert_eq!(back.version, 2);
        assert_eq!(back.produced_by.as_deref(), Some("writer"));
        assert_eq!(back.content_hash, artifact.content_hash);
    }
}
