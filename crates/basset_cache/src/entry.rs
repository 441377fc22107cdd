//! Cache entry types.

use serde::{Deserialize, Serialize};

use crate::AssetKey;

/// Where the bytes of a cached asset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Fetched over HTTP(S).
    External,
    /// Read from the local filesystem.
    Local,
    /// Literal content supplied by the template.
    Inline,
    /// Concatenation of several other sources.
    Bundle,
}

impl SourceKind {
    /// Stable tag mixed into the asset key.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::External => "external",
            SourceKind::Local => "local",
            SourceKind::Inline => "inline",
            SourceKind::Bundle => "bundle",
        }
    }
}

/// Metadata for one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key this entry is stored under.
    pub key: AssetKey,

    /// The reference as written in the template (URL, path, or bundle name).
    pub source: String,

    /// Kind of source.
    pub kind: SourceKind,

    /// Member references of a bundle, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,

    /// Whether minification was requested.
    #[serde(default)]
    pub minify: bool,

    /// Path of the artifact relative to the disk root.
    pub artifact_path: String,

    /// Fingerprint of the source at resolution time.
    #[serde(default)]
    pub source_fingerprint: String,

    /// Timestamp when this entry was created (unix seconds).
    #[serde(default)]
    pub created_at: u64,

    /// Size of the artifact in bytes.
    #[serde(default)]
    pub size_bytes: u64,

    /// False when the transform failed and the raw source was stored instead.
    #[serde(default = "default_transformed")]
    pub transformed: bool,
}

fn default_transformed() -> bool {
    true
}

impl CacheEntry {
    /// Creates a new entry stamped with the current time.
    pub fn new(
        key: AssetKey,
        source: impl Into<String>,
        kind: SourceKind,
        artifact_path: impl Into<String>,
        source_fingerprint: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            key,
            source: source.into(),
            kind,
            members: Vec::new(),
            minify: false,
            artifact_path: artifact_path.into(),
            source_fingerprint: source_fingerprint.into(),
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            size_bytes,
            transformed: true,
        }
    }

    /// Sets the bundle members.
    pub fn with_members(mut self, members: Vec<String>) -> Self {
        self.members = members;
        self
    }

    /// Records whether minification was requested.
    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    /// Records whether the transform succeeded.
    pub fn with_transformed(mut self, transformed: bool) -> Self {
        self.transformed = transformed;
        self
    }

    /// Checks the entry against the live fingerprint of its source.
    ///
    /// `None` means the fingerprint could not be observed cheaply (external
    /// and inline sources), in which case the entry is trusted.
    pub fn is_fresh(&self, live_fingerprint: Option<&str>) -> bool {
        match live_fingerprint {
            Some(live) => self.source_fingerprint == live,
            None => true,
        }
    }
}
