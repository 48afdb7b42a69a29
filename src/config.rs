//! TOML configuration parsing and validation.
//!
//! Only `[db]` is required. Every other section falls back to defaults
//! that match the behavior described in the module docs of [`crate::scan`],
//! [`crate::indexer`], [`crate::extract`], and [`crate::search`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub links: LinksConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Catalog writes per transaction before an intermediate commit.
    #[serde(default = "default_scan_batch")]
    pub batch_size: usize,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Paths (relative to the root) matching any of these are not walked.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_scan_progress")]
    pub progress_every: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: default_scan_batch(),
            follow_symlinks: false,
            exclude_globs: Vec::new(),
            progress_every: default_scan_progress(),
        }
    }
}

fn default_scan_batch() -> usize {
    500
}
fn default_scan_progress() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Indexed documents per transaction before an intermediate commit.
    #[serde(default = "default_index_batch")]
    pub batch_size: usize,
    #[serde(default = "default_index_progress")]
    pub progress_every: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: default_index_batch(),
            progress_every: default_index_progress(),
        }
    }
}

fn default_index_batch() -> usize {
    200
}
fn default_index_progress() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Encoding labels tried in order when decoding plain text.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,
    #[serde(default = "default_max_rows")]
    pub max_delimited_rows: usize,
    #[serde(default = "default_max_cells")]
    pub max_spreadsheet_cells: usize,
    /// Upper bound on decompressed bytes read from one ZIP entry.
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            encodings: default_encodings(),
            max_delimited_rows: default_max_rows(),
            max_spreadsheet_cells: default_max_cells(),
            max_entry_bytes: default_max_entry_bytes(),
        }
    }
}

fn default_encodings() -> Vec<String> {
    vec!["utf-8".to_string(), "windows-1252".to_string()]
}
fn default_max_rows() -> usize {
    100_000
}
fn default_max_cells() -> usize {
    10_000
}
fn default_max_entry_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: i64,
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
    /// Score given to hits whose file name contains the boost term.
    #[serde(default = "default_boost")]
    pub boost: f64,
    #[serde(default = "default_snippet_tokens")]
    pub snippet_tokens: i64,
    #[serde(default = "default_highlight_open")]
    pub highlight_open: String,
    #[serde(default = "default_highlight_close")]
    pub highlight_close: String,
    #[serde(default = "default_ellipsis")]
    pub ellipsis: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_limit: default_max_limit(),
            boost: default_boost(),
            snippet_tokens: default_snippet_tokens(),
            highlight_open: default_highlight_open(),
            highlight_close: default_highlight_close(),
            ellipsis: default_ellipsis(),
        }
    }
}

fn default_search_limit() -> i64 {
    50
}
fn default_max_limit() -> i64 {
    500
}
fn default_boost() -> f64 {
    10.0
}
fn default_snippet_tokens() -> i64 {
    12
}
fn default_highlight_open() -> String {
    "[".to_string()
}
fn default_highlight_close() -> String {
    "]".to_string()
}
fn default_ellipsis() -> String {
    " ... ".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinksConfig {
    /// Prefix of the download route served by the external file server.
    #[serde(default = "default_download_base")]
    pub download_base: String,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            download_base: default_download_base(),
        }
    }
}

fn default_download_base() -> String {
    "/download".to_string()
}

impl Config {
    /// A configuration with defaults everywhere and the given database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            scan: ScanConfig::default(),
            index: IndexConfig::default(),
            extraction: ExtractionConfig::default(),
            search: SearchConfig::default(),
            links: LinksConfig::default(),
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.scan.batch_size == 0 {
            anyhow::bail!("scan.batch_size must be > 0");
        }
        if self.index.batch_size == 0 {
            anyhow::bail!("index.batch_size must be > 0");
        }
        if self.scan.progress_every == 0 || self.index.progress_every == 0 {
            anyhow::bail!("progress_every must be > 0");
        }

        if self.extraction.encodings.is_empty() {
            anyhow::bail!("extraction.encodings must list at least one encoding");
        }
        for label in &self.extraction.encodings {
            if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                anyhow::bail!("extraction.encodings: unknown encoding '{}'", label);
            }
        }
        if self.extraction.max_delimited_rows == 0 || self.extraction.max_spreadsheet_cells == 0 {
            anyhow::bail!("extraction row/cell limits must be > 0");
        }

        if self.search.max_limit < 1 {
            anyhow::bail!("search.max_limit must be >= 1");
        }
        if !(1..=self.search.max_limit).contains(&self.search.default_limit) {
            anyhow::bail!("search.default_limit must be in [1, search.max_limit]");
        }
        // FTS5 snippet() accepts between 1 and 64 tokens.
        if !(1..=64).contains(&self.search.snippet_tokens) {
            anyhow::bail!("search.snippet_tokens must be in [1, 64]");
        }
        if !self.search.boost.is_finite() || self.search.boost < 0.0 {
            anyhow::bail!("search.boost must be a non-negative number");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg: Config = toml::from_str("[db]\npath = \"/tmp/shelf.sqlite\"\n").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.scan.batch_size, 500);
        assert_eq!(cfg.index.batch_size, 200);
        assert_eq!(cfg.search.default_limit, 50);
        assert_eq!(cfg.search.max_limit, 500);
        assert_eq!(cfg.links.download_base, "/download");
        assert_eq!(cfg.extraction.encodings, vec!["utf-8", "windows-1252"]);
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let cfg: Config = toml::from_str(
            "[db]\npath = \"x.sqlite\"\n[extraction]\nencodings = [\"klingon-8\"]\n",
        )
        .unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("klingon-8"));
    }

    #[test]
    fn snippet_tokens_are_bounded() {
        let mut cfg = Config::with_db_path("x.sqlite");
        cfg.search.snippet_tokens = 65;
        assert!(cfg.validate().is_err());
        cfg.search.snippet_tokens = 64;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_limit_must_fit_max_limit() {
        let mut cfg = Config::with_db_path("x.sqlite");
        cfg.search.default_limit = 600;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn example_config_parses() {
        let cfg: Config = toml::from_str(include_str!("../config/shelf.example.toml")).unwrap();
        cfg.validate().unwrap();
        assert!(cfg.scan.exclude_globs.is_empty());
        assert_eq!(cfg.scan.batch_size, 500);
    }
}
