//! Results of the maintenance operations.

use std::fmt;

use basset_cache::CacheEntry;

use crate::error::AssetError;
use crate::loader::{Outcome, Resolution};

/// Consistency between the cache map and the artifacts on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Number of entries in the map.
    pub entries: usize,
    /// Number of artifact files on disk.
    pub artifacts: usize,
    /// Entries whose artifact is gone.
    pub missing: Vec<CacheEntry>,
    /// Entries whose artifact size differs from the recorded size, with the
    /// size found on disk.
    pub size_mismatches: Vec<(CacheEntry, u64)>,
    /// Artifact files no entry points at.
    pub orphans: Vec<String>,
}

impl CheckReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.size_mismatches.is_empty() && self.orphans.is_empty()
    }

    /// Total number of problems found.
    pub fn problems(&self) -> usize {
        self.missing.len() + self.size_mismatches.len() + self.orphans.len()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} entries, {} artifacts, {} problem(s)",
            self.entries,
            self.artifacts,
            self.problems()
        )?;
        for entry in &self.missing {
            writeln!(f, "  missing artifact: {} ({})", entry.artifact_path, entry.source)?;
        }
        for (entry, actual) in &self.size_mismatches {
            writeln!(
                f,
                "  size mismatch: {} (expected {} bytes, found {})",
                entry.artifact_path, entry.size_bytes, actual
            )?;
        }
        for orphan in &self.orphans {
            writeln!(f, "  orphan artifact: {}", orphan)?;
        }
        Ok(())
    }
}

/// What `clear` removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Entries removed from the map.
    pub entries: usize,
    /// Artifact files deleted.
    pub artifacts_deleted: usize,
    /// Files that could not be deleted.
    pub failures: Vec<String>,
}

/// What a pre-warm pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    /// Already cached.
    pub hits: usize,
    /// Produced during this pass.
    pub stored: usize,
    /// References that could not be cached.
    pub failed: Vec<(String, AssetError)>,
}

impl WarmReport {
    pub(crate) fn record(&mut self, reference: &str, resolution: &Resolution) {
        match (resolution.outcome, &resolution.error) {
            (Outcome::Hit, _) => self.hits += 1,
            (Outcome::Stored, _) => self.stored += 1,
            (Outcome::Fallback, Some(error)) => {
                self.failed.push((reference.to_string(), error.clone()))
            }
            (Outcome::Fallback, None) => self.failed.push((
                reference.to_string(),
                AssetError::SourceUnavailable(reference.to_string()),
            )),
        }
    }

    /// Number of references visited.
    pub fn total(&self) -> usize {
        self.hits + self.stored + self.failed.len()
    }
}

impl fmt::Display for WarmReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} asset(s): {} cached, {} already cached, {} failed",
            self.total(),
            self.stored,
            self.hits,
            self.failed.len()
        )
    }
}
