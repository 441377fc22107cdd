//! Cache error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing the cache map.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error while reading or writing the map file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The map could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The persisted map file is unreadable.
    #[error("Cache map at {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },
}

impl CacheError {
    /// Creates a corrupted map error.
    pub fn corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
