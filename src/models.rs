//! Core data types: roots, catalog entries, index mappings, run summaries,
//! and search hits.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A crawl root.
#[derive(Debug, Clone, Serialize)]
pub struct Root {
    pub id: i64,
    pub path: String,
    pub last_scan_at: Option<i64>,
    pub files_count: Option<i64>,
    pub total_size_bytes: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One cataloged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub root_id: i64,
    pub path: String,
    pub name: String,
    /// Lowercase, with leading dot. `None` for files without an extension.
    pub ext: Option<String>,
    pub size: i64,
    /// Modification time, epoch seconds.
    pub mtime: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Link between a catalog entry and its current full-text document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMapping {
    pub file_id: i64,
    pub doc_rowid: Option<i64>,
    pub fingerprint: String,
}

/// Change fingerprint of a file, derived from its size and mtime.
///
/// This is a heuristic. Two different contents with the same size and the
/// same mtime produce the same fingerprint and the second one is never
/// re-extracted. Acceptable for slow-changing document shares; a forced
/// reindex is the escape hatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(size: i64, mtime: i64) -> Self {
        Fingerprint(format!("{}-{}", size, mtime))
    }

    pub fn of(entry: &CatalogEntry) -> Self {
        Self::new(entry.size, entry.mtime)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, stored: &str) -> bool {
        self.0 == stored
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one scan run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub root_id: i64,
    pub root_path: String,
    pub candidates: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub total_size_bytes: i64,
    pub files_count: i64,
    pub elapsed_secs: f64,
    pub last_scan_at: DateTime<Utc>,
}

/// Result of one reindex run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexRunSummary {
    pub candidates: u64,
    pub indexed: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Indexed documents whose extracted text was blank (corrupt,
    /// encrypted, or genuinely empty files). Included in `indexed`.
    pub empty: u64,
    pub elapsed_secs: f64,
}

/// A search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub file_id: i64,
    pub name: String,
    pub ext: String,
    pub path: String,
    pub file_link: String,
    pub download_link: String,
    pub size: i64,
    /// ISO-8601, UTC.
    pub mtime: String,
    pub score: f64,
    pub snippet: String,
}

/// A catalog entry together with its index state.
#[derive(Debug, Clone, Serialize)]
pub struct FileDetail {
    pub entry: CatalogEntry,
    pub mapping: Option<IndexMapping>,
    /// Extracted text currently in the index, if the file is indexed.
    pub content: Option<String>,
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_size_dash_mtime() {
        let fp = Fingerprint::new(1024, 1_700_000_000);
        assert_eq!(fp.as_str(), "1024-1700000000");
        assert!(fp.matches("1024-1700000000"));
        assert!(!fp.matches("1025-1700000000"));
    }

    #[test]
    fn fingerprint_ignores_content() {
        // Same size and mtime means "unchanged", whatever the bytes are.
        assert_eq!(Fingerprint::new(5, 10), Fingerprint::new(5, 10));
    }

    #[test]
    fn iso_timestamps_are_utc() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_ts_iso(1_700_000_000), "2023-11-14T22:13:20Z");
    }
}
