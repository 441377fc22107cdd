//! Basset source fetching.
//!
//! Turns an asset reference into an [`AssetSource`] and reads its bytes, over
//! HTTP for external references and from the filesystem for local ones.

pub mod error;
pub mod http_client;
pub mod local;
pub mod security;
pub mod source;

pub use error::FetchError;
pub use http_client::{HttpClient, HttpClientBuilder};
pub use local::read_local;
pub use security::{SecurityError, validate_local_path, validate_url};
pub use source::AssetSource;
