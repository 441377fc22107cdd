//! Error types for fetch operations.

use thiserror::Error;

use crate::security::SecurityError;

/// Error type for source fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network request failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success HTTP status.
    #[error("HTTP error {status} for {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    /// Body exceeds the configured limit.
    #[error("Response too large: {size} bytes exceeds maximum of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    /// The reference could not be understood.
    #[error("Invalid asset reference: {0}")]
    InvalidReference(String),

    /// Security error (SSRF or path traversal protection).
    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to build HTTP client.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, 5xx and 429 are transient. Everything
    /// else (404, other 4xx, size limits, security refusals) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            FetchError::HttpStatus { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}
