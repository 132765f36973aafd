//! Timestamp and identifier helpers shared across the crate.

use chrono::{DateTime, Utc};

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// Format: `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Generates a fresh run identifier.
#[must_use]
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Converts a heading into its anchor slug.
///
/// Lowercases, maps whitespace and underscores to dashes, drops any other
/// non-alphanumeric characters, and collapses consecutive dashes.
#[must_use]
pub fn slugify(heading: &str) -> String {
    let mut slug = String::with_capacity(heading.len());
    let mut last_dash = true;
    for ch in heading.trim().chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
            last_dash = false;
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Results and Discussion"), "results-and-discussion");
        assert_eq!(slugify("  Methods  "), "methods");
    }

    #[test]
    fn test_slugify_strips_punctuation() {
        assert_eq!(slugify("Appendix B: Tables"), "appendix-b-tables");
        assert_eq!(slugify("a__b--c"), "a-b-c");
    }
}
