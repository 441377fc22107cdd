//! Artifact storage.

use std::io;
use std::sync::Arc;

use basset_cache::AssetKey;
use tracing::debug;

use crate::disk::Disk;

/// Characters of the source fingerprint kept in an artifact's file name.
const REVISION_LEN: usize = 16;

/// Stores artifacts on a [`Disk`] under key-derived paths.
///
/// The path of an artifact is a pure function of its key, the fingerprint of
/// the source bytes it was built from, and its extension. A source that
/// changes under the same key therefore lands at a new path, and a path never
/// has its content replaced by different bytes.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    disk: Arc<dyn Disk>,
    prefix: String,
}

impl ArtifactStore {
    pub fn new(disk: Arc<dyn Disk>, prefix: impl Into<String>) -> Self {
        Self {
            disk,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Disk path of the artifact for `key` built from a source with
    /// `fingerprint`: `<prefix>/<shard>/<key>.<revision>.<ext>`.
    pub fn artifact_path(&self, key: &AssetKey, fingerprint: &str, ext: Option<&str>) -> String {
        let revision = fingerprint.get(..REVISION_LEN).unwrap_or(fingerprint);
        let mut file = key.to_string();
        for part in [Some(revision), ext].into_iter().flatten() {
            if !part.is_empty() {
                file.push('.');
                file.push_str(part);
            }
        }

        if self.prefix.is_empty() {
            format!("{}/{}", key.shard(), file)
        } else {
            format!("{}/{}/{}", self.prefix, key.shard(), file)
        }
    }

    /// Writes the artifact unless it already exists.
    pub fn write(
        &self,
        key: &AssetKey,
        fingerprint: &str,
        ext: Option<&str>,
        bytes: &[u8],
    ) -> io::Result<String> {
        let path = self.artifact_path(key, fingerprint, ext);
        if self.disk.exists(&path) {
            debug!("Artifact {} already present", path);
            return Ok(path);
        }
        self.disk.put(&path, bytes)?;
        Ok(path)
    }

    /// Writes the artifact, atomically replacing an existing one.
    ///
    /// Used by forced rebuilds to repair an artifact that was altered on disk.
    pub fn replace(
        &self,
        key: &AssetKey,
        fingerprint: &str,
        ext: Option<&str>,
        bytes: &[u8],
    ) -> io::Result<String> {
        let path = self.artifact_path(key, fingerprint, ext);
        self.disk.put(&path, bytes)?;
        Ok(path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.disk.exists(path)
    }

    pub fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.disk.get(path)
    }

    pub fn delete(&self, path: &str) -> io::Result<()> {
        self.disk.delete(path)
    }

    /// Maps an artifact path to the reference templates render. No I/O.
    pub fn public_reference(&self, path: &str) -> String {
        self.disk.url(path)
    }

    /// Lists every artifact file under the prefix.
    ///
    /// Dot files are skipped: the cache map and in-progress temp files live
    /// next to the artifacts.
    pub fn list_artifacts(&self) -> io::Result<Vec<String>> {
        let dir = if self.prefix.is_empty() { "." } else { &self.prefix };
        let files = self.disk.list(dir)?;
        Ok(files
            .into_iter()
            .filter(|path| {
                path.rsplit('/')
                    .next()
                    .is_some_and(|name| !name.starts_with('.'))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::LocalDisk;
    use basset_cache::fingerprint;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn key(identity: &str) -> AssetKey {
        AssetKey::derive("external", identity.as_bytes(), "minify=1;group=")
    }

    fn store(root: &std::path::Path) -> ArtifactStore {
        ArtifactStore::new(Arc::new(LocalDisk::new(root, "/storage")), "basset")
    }

    #[test]
    fn test_artifact_path_is_derived_from_key_and_source() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let key = key("https://cdn.example.com/lib.js");
        let fp = fingerprint(b"var a;");

        let path = store.artifact_path(&key, &fp, Some("js"));
        assert_eq!(path, format!("basset/{}/{}.{}.js", key.shard(), key, &fp[..16]));
        assert_eq!(store.artifact_path(&key, &fp, Some("js")), path);
        assert_eq!(
            store.artifact_path(&key, &fp, None),
            format!("basset/{}/{}.{}", key.shard(), key, &fp[..16])
        );
        assert_eq!(
            store.artifact_path(&key, "", None),
            format!("basset/{}/{}", key.shard(), key)
        );
    }

    #[test]
    fn test_changed_source_gets_a_new_path() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let key = key("app.css");

        let red = store.write(&key, &fingerprint(b"red"), Some("css"), b"red").unwrap();
        let blue = store.write(&key, &fingerprint(b"blue"), Some("css"), b"blue").unwrap();
        assert_ne!(red, blue);
        assert_eq!(store.read(&red).unwrap(), b"red");
        assert_eq!(store.read(&blue).unwrap(), b"blue");
    }

    #[test]
    fn test_write_is_once() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let key = key("https://cdn.example.com/lib.js");
        let fp = fingerprint(b"source");

        let first = store.write(&key, &fp, Some("js"), b"first").unwrap();
        let second = store.write(&key, &fp, Some("js"), b"second").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.read(&first).unwrap(), b"first");

        store.replace(&key, &fp, Some("js"), b"third").unwrap();
        assert_eq!(store.read(&first).unwrap(), b"third");
    }

    #[test]
    fn test_public_reference() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(
            store.public_reference("basset/ab/abc.css"),
            "/storage/basset/ab/abc.css"
        );
    }

    #[test]
    fn test_list_skips_dot_files() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let key = key("https://cdn.example.com/lib.js");
        let path = store.write(&key, "", Some("js"), b"x").unwrap();
        std::fs::write(dir.path().join("basset").join(".basset"), "{}").unwrap();

        assert_eq!(store.list_artifacts().unwrap(), vec![path.clone()]);

        store.delete(&path).unwrap();
        assert!(!store.exists(&path));
        assert!(store.list_artifacts().unwrap().is_empty());
    }
}
