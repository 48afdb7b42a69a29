//! Error type for catalog, index, and search operations.
//!
//! Not-found, validation, and permission errors are raised before a run
//! starts. [`Error::Io`] is the per-file failure class: scan and reindex
//! count it in their summaries instead of returning it. [`Error::Storage`]
//! is run-fatal and aborts the open batch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl Error {
    /// True for failures that must abort a whole scan or reindex run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
