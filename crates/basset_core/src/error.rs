//! Error types.

use std::time::Duration;

use thiserror::Error;

/// Why a resolution could not be served from a fresh artifact.
///
/// These never abort a render. They are recorded on the
/// [`Resolution`](crate::Resolution) and in the loader stats, and the caller
/// receives a usable reference regardless.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// The source could not be fetched or read.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Minification or bundling failed; the raw source was used.
    #[error("Transform failed: {0}")]
    TransformFailed(String),

    /// The artifact could not be written; the asset was served uncached.
    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    /// The persisted cache map was unreadable and has been discarded.
    #[error("Cache map corrupt: {0}")]
    CacheMapCorrupt(String),
}

/// Errors from constructing or administering Basset.
#[derive(Debug, Error)]
pub enum BassetError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cache map error.
    #[error("Cache error: {0}")]
    Cache(#[from] basset_cache::CacheError),

    /// Fetch setup error.
    #[error("Fetch error: {0}")]
    Fetch(#[from] basset_fetch::FetchError),

    /// Persisting the cache map did not finish in time.
    #[error("Persisting the cache map timed out after {0:?}")]
    PersistTimeout(Duration),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BassetError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
