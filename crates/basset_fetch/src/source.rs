//! Asset reference parsing.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::FetchError;
use crate::security::validate_local_path;

/// Where an asset's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Hosted on another server.
    External(Url),
    /// A file under the local asset root.
    Local(PathBuf),
    /// Literal content from a template block.
    Inline { name: String, content: String },
}

impl AssetSource {
    /// Parses a template reference.
    ///
    /// `http://`, `https://` and protocol-relative `//host/...` references are
    /// external. Everything else is a path under `root`.
    pub fn parse(reference: &str, root: &Path) -> Result<Self, FetchError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(FetchError::InvalidReference("empty reference".into()));
        }

        if let Some(rest) = reference.strip_prefix("//") {
            let url = Url::parse(&format!("https://{rest}"))
                .map_err(|e| FetchError::InvalidReference(format!("{reference}: {e}")))?;
            return Ok(Self::External(url));
        }

        if reference.starts_with("http://") || reference.starts_with("https://") {
            let url = Url::parse(reference)
                .map_err(|e| FetchError::InvalidReference(format!("{reference}: {e}")))?;
            return Ok(Self::External(url));
        }

        if reference.contains("://") {
            return Err(FetchError::InvalidReference(format!(
                "unsupported scheme in {reference}"
            )));
        }

        let path = validate_local_path(reference, root)?;
        Ok(Self::Local(path))
    }

    /// Creates an inline source.
    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Inline {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Bytes that identify this source for keying.
    pub fn identity(&self) -> Vec<u8> {
        match self {
            Self::External(url) => url.as_str().as_bytes().to_vec(),
            Self::Local(path) => path.to_string_lossy().into_owned().into_bytes(),
            Self::Inline { content, .. } => content.as_bytes().to_vec(),
        }
    }

    /// Lowercase file extension, without query string or fragment.
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            Self::External(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default()
                .to_string(),
            Self::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Inline { name, .. } => name.clone(),
        };

        Path::new(&name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    /// Whether this source lives on another server.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}
