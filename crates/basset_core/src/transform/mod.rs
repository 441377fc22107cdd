//! Pure byte transforms applied before an artifact is stored.
//!
//! Minification is deliberately conservative: comments and redundant
//! whitespace are removed, nothing is renamed or reordered. Licence comments
//! (`/*! ... */`) are kept.

mod css;
mod js;

use thiserror::Error;

pub use css::minify_css;
pub use js::minify_js;

/// Errors raised by a transform. The loader recovers by storing the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("source is not valid UTF-8")]
    InvalidUtf8,

    #[error("unterminated {what} starting at character {position}")]
    Unterminated { what: &'static str, position: usize },
}

/// What an asset is, as far as transforms are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetType {
    Script,
    Style,
    Other,
}

impl AssetType {
    /// Classifies an asset by its lowercase file extension.
    pub fn from_extension(ext: Option<&str>) -> Self {
        match ext {
            Some("js" | "mjs" | "cjs") => AssetType::Script,
            Some("css") => AssetType::Style,
            _ => AssetType::Other,
        }
    }

    /// Separator placed between bundle members.
    fn separator(&self) -> &'static [u8] {
        match self {
            AssetType::Script => b";\n",
            AssetType::Style | AssetType::Other => b"\n",
        }
    }
}

/// Applies the transform for `asset_type` to `bytes`.
///
/// Without `minify`, or for assets that are neither scripts nor styles, the
/// bytes are returned unchanged.
pub fn transform(asset_type: AssetType, bytes: &[u8], minify: bool) -> Result<Vec<u8>, TransformError> {
    if !minify || asset_type == AssetType::Other {
        return Ok(bytes.to_vec());
    }

    let source = std::str::from_utf8(bytes).map_err(|_| TransformError::InvalidUtf8)?;
    let minified = match asset_type {
        AssetType::Style => minify_css(source)?,
        AssetType::Script => minify_js(source)?,
        AssetType::Other => source.to_string(),
    };
    Ok(minified.into_bytes())
}

/// Concatenates bundle members in order.
pub fn concat(asset_type: AssetType, members: &[Vec<u8>]) -> Vec<u8> {
    let separator = asset_type.separator();
    let mut out = Vec::with_capacity(members.iter().map(|m| m.len() + separator.len()).sum());
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(separator);
        }
        out.extend_from_slice(member);
    }
    out
}
