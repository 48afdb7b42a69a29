//! # shelf
//!
//! A file catalog with an incremental full-text index over shared
//! document folders.
//!
//! shelf walks registered root directories into a SQLite catalog, extracts
//! text from office documents, PDFs, and plain text files into an FTS5
//! index, and answers ranked, filtered, permission-scoped searches.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐
//! │  Roots   │──▶│  Scanner  │──▶│  Catalog  │──▶│ Indexer  │
//! │ (disk)   │   │  walkdir  │   │  files    │   │ extract  │
//! └──────────┘   └───────────┘   └─────┬─────┘   └────┬─────┘
//!                                      │              ▼
//!                                      │        ┌───────────┐
//!                                      └───────▶│ FTS5 docs │
//!                                               └─────┬─────┘
//!                                                     ▼
//!                                               ┌───────────┐
//!                                               │  Search   │
//!                                               └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelf init
//! shelf root add /srv/projects
//! shelf scan 1
//! shelf index
//! shelf search '"budget review" OR forecast' --ext pdf,docx --project ACME
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Core error type |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`models`] | Core data types |
//! | [`roots`] | Crawl root records |
//! | [`access`] | Access levels and permission checks |
//! | [`catalog`] | File catalog reads and writes |
//! | [`filter`] | Structured filter builder |
//! | [`scan`] | Directory scanner |
//! | [`extract`] | Text extraction per file format |
//! | [`indexer`] | Incremental full-text indexer |
//! | [`search`] | Ranked full-text search |
//! | [`get`] | Single-file retrieval |
//! | [`stats`] | Catalog and index statistics |
//! | [`progress`] | Progress reporting |
//! | [`engine`] | Shared entry point with per-root locking |

pub mod access;
pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod extract;
pub mod filter;
pub mod get;
pub mod indexer;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod roots;
pub mod scan;
pub mod search;
pub mod stats;

pub use engine::Engine;
pub use error::{Error, Result};
