//! Storage disks artifacts are written to.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Who may read files written to a disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// World readable (0644).
    #[default]
    Public,
    /// Owner only (0600).
    Private,
}

impl Visibility {
    /// Unix permission bits for files with this visibility.
    pub fn mode(&self) -> u32 {
        match self {
            Visibility::Public => 0o644,
            Visibility::Private => 0o600,
        }
    }
}

/// The five storage operations Basset needs, plus a listing used by `check`.
///
/// Paths are relative, `/` separated, and never contain `..`.
pub trait Disk: Send + Sync + fmt::Debug {
    /// Atomically writes `bytes` to `path`, replacing any previous file.
    fn put(&self, path: &str, bytes: &[u8]) -> io::Result<()>;

    /// Reads the file at `path`.
    fn get(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Returns whether a file exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Public URL of `path`. Pure; performs no I/O.
    fn url(&self, path: &str) -> String;

    /// Deletes the file at `path`. Deleting a missing file succeeds.
    fn delete(&self, path: &str) -> io::Result<()>;

    /// Lists every file below `dir`, recursively, as disk paths.
    fn list(&self, dir: &str) -> io::Result<Vec<String>>;
}

/// A disk backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalDisk {
    root: PathBuf,
    url_base: String,
    visibility: Visibility,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>, url_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_base: url_base.into(),
            visibility: Visibility::default(),
        }
    }

    /// Sets the visibility of written files.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory if it does not exist yet.
    pub fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// Maps a disk path to a filesystem path, rejecting anything that could
    /// escape the root.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid disk path: {path}"),
            ));
        }
        Ok(self.root.join(relative))
    }

    #[cfg(unix)]
    fn apply_visibility(&self, file: &Path) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(file, fs::Permissions::from_mode(self.visibility.mode()))
    }

    #[cfg(not(unix))]
    fn apply_visibility(&self, _file: &Path) -> io::Result<()> {
        Ok(())
    }
}

impl Disk for LocalDisk {
    fn put(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.resolve(path)?;
        let parent = target.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;

        // Readers either see the old file or the complete new one.
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        self.apply_visibility(temp.path())?;
        temp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }

    fn get(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_file())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.url_base.trim_end_matches('/'), path)
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        match fs::remove_file(self.resolve(path)?) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn list(&self, dir: &str) -> io::Result<Vec<String>> {
        let base = self.resolve(dir)?;
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&base) {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                let parts: Vec<String> = relative
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect();
                files.push(parts.join("/"));
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn test_put_get_delete() {
        let dir = tempdir().unwrap();
        let disk = LocalDisk::new(dir.path(), "/storage");

        disk.put("basset/ab/abc.js", b"var a;").unwrap();
        assert!(disk.exists("basset/ab/abc.js"));
        assert_eq!(disk.get("basset/ab/abc.js").unwrap(), b"var a;");

        disk.put("basset/ab/abc.js", b"var b;").unwrap();
        assert_eq!(disk.get("basset/ab/abc.js").unwrap(), b"var b;");

        disk.delete("basset/ab/abc.js").unwrap();
        assert!(!disk.exists("basset/ab/abc.js"));
        disk.delete("basset/ab/abc.js").unwrap();
    }

    #[test]
    fn test_url_joins_base() {
        let disk = LocalDisk::new("/srv", "https://app.test/storage/");
        assert_eq!(
            disk.url("basset/ab/abc.css"),
            "https://app.test/storage/basset/ab/abc.css"
        );
    }

    #[test]
    fn test_list_is_recursive_and_sorted() {
        let dir = tempdir().unwrap();
        let disk = LocalDisk::new(dir.path(), "/storage");
        disk.put("basset/cd/2.js", b"2").unwrap();
        disk.put("basset/ab/1.js", b"1").unwrap();
        disk.put("other/3.js", b"3").unwrap();

        assert_eq!(
            disk.list("basset").unwrap(),
            vec!["basset/ab/1.js", "basset/cd/2.js"]
        );
        assert!(disk.list("missing").unwrap().is_empty());
    }

    #[rstest]
    #[case("../escape.js")]
    #[case("basset/../../escape.js")]
    #[case("/etc/passwd")]
    #[case("")]
    fn test_rejects_unsafe_paths(#[case] path: &str) {
        let dir = tempdir().unwrap();
        let disk = LocalDisk::new(dir.path(), "/storage");
        let err = disk.put(path, b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(!disk.exists(path));
    }

    #[cfg(unix)]
    #[rstest]
    #[case(Visibility::Public, 0o644)]
    #[case(Visibility::Private, 0o600)]
    fn test_visibility_sets_mode(#[case] visibility: Visibility, #[case] mode: u32) {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let disk = LocalDisk::new(dir.path(), "/storage").with_visibility(visibility);
        disk.put("a.css", b"a{}").unwrap();

        let actual = fs::metadata(dir.path().join("a.css"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(actual & 0o777, mode);
    }
}
