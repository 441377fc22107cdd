//! Guards applied before a source is read.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),
    #[error("Access to loopback address denied: {0}")]
    LoopbackDenied(String),
    #[error("Access to private IP address denied: {0}")]
    PrivateIpDenied(String),
    #[error("Path escapes the asset root: {0}")]
    PathTraversal(String),
}

/// Checks that an external asset URL is safe to fetch.
///
/// Only `http` and `https` are accepted. Unless `allow_local` is set,
/// loopback, private and link-local hosts are refused.
pub fn validate_url(url: &Url, allow_local: bool) -> Result<(), SecurityError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SecurityError::InvalidScheme(url.scheme().to_string()));
    }

    if allow_local {
        return Ok(());
    }

    match url.host() {
        Some(Host::Domain(domain)) => {
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(SecurityError::LoopbackDenied(domain.to_string()));
            }
        }
        Some(Host::Ipv4(ipv4)) => {
            if ipv4.is_loopback() || ipv4.is_unspecified() {
                return Err(SecurityError::LoopbackDenied(ipv4.to_string()));
            }
            if ipv4.is_private() || ipv4.is_link_local() {
                return Err(SecurityError::PrivateIpDenied(ipv4.to_string()));
            }
        }
        Some(Host::Ipv6(ipv6)) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return Err(SecurityError::LoopbackDenied(ipv6.to_string()));
            }
            // Unique local (fc00::/7)
            if (ipv6.segments()[0] & 0xfe00) == 0xfc00 || ipv6.is_unicast_link_local() {
                return Err(SecurityError::PrivateIpDenied(ipv6.to_string()));
            }
        }
        None => {}
    }

    Ok(())
}

/// Joins a template-supplied relative path onto `root`, refusing anything
/// that would leave it.
pub fn validate_local_path(relative: &str, root: &Path) -> Result<PathBuf, SecurityError> {
    let trimmed = relative.trim_start_matches('/');
    let mut resolved = root.to_path_buf();

    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SecurityError::PathTraversal(relative.to_string()));
            }
        }
    }

    if resolved == root {
        return Err(SecurityError::PathTraversal(relative.to_string()));
    }

    Ok(resolved)
}
