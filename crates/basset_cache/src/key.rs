//! Asset keys and source fingerprints.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Length of a hex-encoded BLAKE3 digest.
const KEY_LEN: usize = 64;

/// Deterministic identifier of a cached artifact.
///
/// A key is the BLAKE3 digest of the source kind, the source identity (URL,
/// canonical path, inline content, or member keys of a bundle) and the
/// canonical transform parameters. Identical inputs always produce the same
/// key. Together with the source fingerprint it locates the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AssetKey(String);

impl AssetKey {
    /// Derives a key from its three components.
    pub fn derive(kind: &str, identity: &[u8], params: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_bytes());
        hasher.update(&[0]);
        hasher.update(identity);
        hasher.update(&[0]);
        hasher.update(params.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Parses a key from its hex form, rejecting anything that is not a
    /// lowercase 64 character digest.
    pub fn parse(hex: &str) -> Option<Self> {
        let valid = hex.len() == KEY_LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex.to_string()))
    }

    /// Returns the hex form of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two character prefix used to fan artifacts out over directories.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AssetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid asset key: {raw}")))
    }
}

/// Computes the fingerprint of source bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derive_is_deterministic() {
        let a = AssetKey::derive("external", b"https://cdn.example.com/lib.js", "minify=1;group=");
        let b = AssetKey::derive("external", b"https://cdn.example.com/lib.js", "minify=1;group=");
        assert_eq!(a, b);
    }

    #[test]
    fn test_params_change_key() {
        let minified = AssetKey::derive("external", b"https://cdn.example.com/lib.js", "minify=1;group=");
        let raw = AssetKey::derive("external", b"https://cdn.example.com/lib.js", "minify=0;group=");
        assert_ne!(minified, raw);
    }

    #[test]
    fn test_kind_separates_identical_identity() {
        let local = AssetKey::derive("local", b"app.css", "");
        let inline = AssetKey::derive("inline", b"app.css", "");
        assert_ne!(local, inline);
    }

    #[test]
    fn test_component_boundaries_are_unambiguous() {
        let a = AssetKey::derive("local", b"ab", "c");
        let b = AssetKey::derive("local", b"a", "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(AssetKey::parse("not-a-key").is_none());
        assert!(AssetKey::parse(&"A".repeat(64)).is_none());
        assert!(AssetKey::parse(&"a".repeat(63)).is_none());
        assert!(AssetKey::parse(&"a".repeat(64)).is_some());
    }

    #[test]
    fn test_shard_is_key_prefix() {
        let key = AssetKey::derive("local", b"app.js", "");
        assert_eq!(key.shard(), &key.as_str()[..2]);
    }

    #[test]
    fn test_deserialize_validates() {
        let key = AssetKey::derive("local", b"app.js", "");
        let json = serde_json::to_string(&key).unwrap();
        let back: AssetKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        assert!(serde_json::from_str::<AssetKey>("\"../../etc/passwd\"").is_err());
    }

    proptest! {
        #[test]
        fn test_derived_keys_always_parse(identity in any::<Vec<u8>>(), params in ".*") {
            let key = AssetKey::derive("inline", &identity, &params);
            prop_assert_eq!(AssetKey::parse(key.as_str()), Some(key.clone()));
            prop_assert_eq!(key, AssetKey::derive("inline", &identity, &params));
        }
    }
}
