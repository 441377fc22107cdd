//! The persistent asset cache map.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{AssetKey, CacheEntry, CacheError};

/// Version written into the map file.
pub const CACHE_MAP_VERSION: u32 = 1;

/// Result of a validated lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The entry exists, its artifact is present and its source is unchanged.
    Hit(CacheEntry),
    /// No entry for the key.
    Missing,
    /// The entry exists but its artifact is gone.
    ArtifactMissing(CacheEntry),
    /// The entry exists but the source changed since it was cached.
    Stale(CacheEntry),
}

#[derive(Serialize)]
struct PersistedMap<'a> {
    version: u32,
    entries: BTreeMap<&'a str, &'a CacheEntry>,
}

/// Thread-safe mapping from [`AssetKey`] to [`CacheEntry`].
///
/// Reads and writes take a short `RwLock`; callers never hold the lock across
/// I/O because every accessor clones what it returns.
#[derive(Debug, Default)]
pub struct CacheMap {
    entries: RwLock<HashMap<AssetKey, CacheEntry>>,
    dirty: AtomicBool,
}

impl CacheMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a map from disk, falling back to an empty map on any problem.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(map) => map,
            Err(e) => {
                warn!("Discarding cache map: {}", e);
                Self::new()
            }
        }
    }

    /// Loads a map from disk.
    ///
    /// An absent file yields an empty map. A file that is not a JSON object
    /// with an `entries` object is an error. Records that fail to parse are
    /// dropped individually.
    pub fn try_load(path: &Path) -> Result<Self, CacheError> {
        if !path.exists() {
            debug!("No cache map found at {}", path.display());
            return Ok(Self::new());
        }

        let content = fs::read(path)?;
        let value: serde_json::Value = serde_json::from_slice(&content)
            .map_err(|e| CacheError::corrupted(path, e.to_string()))?;

        let version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0);
        if version > u64::from(CACHE_MAP_VERSION) {
            debug!(
                "Cache map version {} is newer than {}, reading known fields only",
                version, CACHE_MAP_VERSION
            );
        }

        let records = value
            .get("entries")
            .and_then(|e| e.as_object())
            .ok_or_else(|| CacheError::corrupted(path, "missing `entries` object"))?;

        let mut entries = HashMap::with_capacity(records.len());
        let mut dropped = 0usize;
        for (raw_key, record) in records {
            let parsed = AssetKey::parse(raw_key).and_then(|key| {
                serde_json::from_value::<CacheEntry>(record.clone())
                    .ok()
                    .filter(|entry| entry.key == key)
                    .map(|entry| (key, entry))
            });

            match parsed {
                Some((key, entry)) => {
                    entries.insert(key, entry);
                }
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            warn!(
                "Dropped {} unreadable record(s) from {}",
                dropped,
                path.display()
            );
        }
        info!("Loaded {} cache map entries", entries.len());

        Ok(Self {
            entries: RwLock::new(entries),
            dirty: AtomicBool::new(dropped > 0),
        })
    }

    /// Saves the map atomically: the snapshot is written to a temporary file
    /// beside `path` and renamed over it.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        // Cleared before the snapshot so a concurrent `put` re-dirties the map.
        self.dirty.store(false, Ordering::SeqCst);

        let result = self.write_snapshot(parent, path);
        if result.is_err() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        result
    }

    fn write_snapshot(&self, parent: &Path, path: &Path) -> Result<(), CacheError> {
        let bytes = {
            let entries = self.entries.read();
            let persisted = PersistedMap {
                version: CACHE_MAP_VERSION,
                entries: entries.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            };
            serde_json::to_vec_pretty(&persisted)
                .map_err(|e| CacheError::Serialization(e.to_string()))?
        };

        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| CacheError::Io(e.error))?;

        info!("Saved {} cache map entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Returns a copy of the raw entry for `key`, without validation.
    pub fn get(&self, key: &AssetKey) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Looks up `key` and validates the entry.
    ///
    /// `artifact_exists` is called after the lock is released.
    pub fn lookup(
        &self,
        key: &AssetKey,
        live_fingerprint: Option<&str>,
        artifact_exists: impl FnOnce(&CacheEntry) -> bool,
    ) -> Lookup {
        let Some(entry) = self.get(key) else {
            return Lookup::Missing;
        };

        if !artifact_exists(&entry) {
            debug!("Artifact for {} is missing", entry.source);
            Lookup::ArtifactMissing(entry)
        } else if !entry.is_fresh(live_fingerprint) {
            debug!("Source {} changed since it was cached", entry.source);
            Lookup::Stale(entry)
        } else {
            Lookup::Hit(entry)
        }
    }

    /// Stores an entry, replacing any previous entry for the key.
    pub fn put(&self, key: AssetKey, entry: CacheEntry) {
        self.entries.write().insert(key, entry);
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Removes an entry.
    pub fn remove(&self, key: &AssetKey) -> Option<CacheEntry> {
        let removed = self.entries.write().remove(key);
        if removed.is_some() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    /// Removes every entry and returns them so their artifacts can be deleted.
    pub fn clear(&self) -> Vec<CacheEntry> {
        let removed: Vec<CacheEntry> = self.entries.write().drain().map(|(_, v)| v).collect();
        if !removed.is_empty() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    /// Returns a snapshot of all entries, ordered by key.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Returns every key, sorted.
    pub fn keys(&self) -> Vec<AssetKey> {
        let mut keys: Vec<AssetKey> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns whether the map changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Marks the in-memory map as matching what is on disk, e.g. after the
    /// map file was deleted together with every entry.
    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
