//! Cache error types.

use thiserror::Error;

/// Cache error type.
///
/// Only write paths return these. Reads of malformed records are logged
/// and treated as absent.
#[derive(Error, Debug)]
pub enum CacheError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing store error
    #[error("Store error: {0}")]
    Store(String),
}

/// Result type alias using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;
