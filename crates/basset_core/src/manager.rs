//! The process-scoped Basset facade.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use basset_cache::{CacheMap, SourceKind};
use basset_fetch::{AssetSource, HttpClient};
use futures_util::{StreamExt, stream};
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::config::BassetConfig;
use crate::disk::LocalDisk;
use crate::error::{AssetError, BassetError};
use crate::loader::{Loader, ResolveOptions, Resolution};
use crate::report::{CheckReport, ClearReport, WarmReport};
use crate::scanner::ViewScanner;
use crate::stats::StatsSnapshot;
use crate::store::ArtifactStore;

/// Number of references warmed concurrently.
const WARM_CONCURRENCY: usize = 8;

/// Something `cache`, `fresh` and `internalize` can resolve ahead of time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarmTarget {
    Reference {
        reference: String,
        minify: bool,
    },
    Bundle {
        name: String,
        members: Vec<String>,
        minify: bool,
    },
}

impl WarmTarget {
    fn label(&self) -> &str {
        match self {
            WarmTarget::Reference { reference, .. } => reference,
            WarmTarget::Bundle { name, .. } => name,
        }
    }
}

/// Owns the loader, the cache map and the runtime that drives them.
///
/// Construct one per process with [`Manager::open`], resolve through it, and
/// call [`Manager::terminate`] (or hold a [`ManagerGuard`]) so the cache map
/// is saved on the way out.
///
/// The blocking methods drive an internal runtime and must not be called
/// from inside another async runtime; use
/// [`resolve_async`](Self::resolve_async) there.
#[derive(Debug)]
pub struct Manager {
    config: BassetConfig,
    loader: Arc<Loader>,
    runtime: Runtime,
    map_path: PathBuf,
    load_error: Option<AssetError>,
    terminated: AtomicBool,
}

impl Manager {
    /// Builds the disk, store, HTTP client and runtime, and loads the cache
    /// map. A corrupt map is discarded, not fatal.
    pub fn open(config: BassetConfig) -> Result<Self, BassetError> {
        debug!("Opening Basset with config {}", config.hash());

        let disk = LocalDisk::new(config.disk_root(), config.disk.url.clone())
            .with_visibility(config.disk.visibility);
        disk.ensure_root()?;
        let store = ArtifactStore::new(Arc::new(disk), config.path.clone());

        let http = HttpClient::builder()
            .timeout(config.fetch_timeout())
            .retries(config.fetch.retries)
            .allow_local(config.fetch.allow_local)
            .max_size(config.fetch.max_size)
            .build()?;

        let map_path = config.cache_map_file();
        let mut load_error = None;
        let map = if config.cache_map {
            CacheMap::try_load(&map_path).unwrap_or_else(|e| {
                warn!("Discarding cache map {}: {}", map_path.display(), e);
                load_error = Some(AssetError::CacheMapCorrupt(e.to_string()));
                CacheMap::new()
            })
        } else {
            CacheMap::new()
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("basset")
            .build()?;

        let loader = Loader::new(Arc::new(map), store, http, config.assets_root())
            .with_verify_fingerprints(config.verify_fingerprints)
            .with_max_size(config.fetch.max_size);

        Ok(Self {
            config,
            loader: Arc::new(loader),
            runtime,
            map_path,
            load_error,
            terminated: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &BassetConfig {
        &self.config
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    /// Where the cache map is persisted.
    pub fn map_path(&self) -> &Path {
        &self.map_path
    }

    /// The error the cache map was discarded with at startup, if any.
    pub fn load_error(&self) -> Option<&AssetError> {
        self.load_error.as_ref()
    }

    /// Options built from the configured defaults.
    pub fn default_options(&self) -> ResolveOptions {
        ResolveOptions::new(self.config.minify)
    }

    /// Resolves `reference` and returns the reference to render.
    pub fn resolve(&self, reference: &str, options: &ResolveOptions) -> String {
        self.resolve_detailed(reference, options).reference
    }

    /// Resolves `reference`, returning how it was served.
    pub fn resolve_detailed(&self, reference: &str, options: &ResolveOptions) -> Resolution {
        self.runtime.block_on(self.loader.resolve(reference, options))
    }

    /// Resolves `reference` from within an async context.
    pub async fn resolve_async(&self, reference: &str, options: &ResolveOptions) -> Resolution {
        self.loader.resolve(reference, options).await
    }

    /// Caches a literal code block. See [`Loader::resolve_inline`].
    pub fn resolve_inline(&self, name: &str, content: &str, options: &ResolveOptions) -> Resolution {
        self.runtime
            .block_on(self.loader.resolve_inline(name, content, options))
    }

    /// Bundles `references` under `name`. See [`Loader::resolve_bundle`].
    pub fn resolve_bundle(
        &self,
        name: &str,
        references: &[impl AsRef<str>],
        options: &ResolveOptions,
    ) -> Vec<Resolution> {
        self.runtime
            .block_on(self.loader.resolve_bundle(name, references, options))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.loader.stats().snapshot()
    }

    /// Saves the cache map if it changed. Returns whether a write happened.
    ///
    /// The save runs off the calling thread and is abandoned after
    /// `persist_timeout_secs`.
    pub fn persist(&self) -> Result<bool, BassetError> {
        let map = Arc::clone(self.loader.map());
        if !self.config.cache_map || !map.is_dirty() {
            return Ok(false);
        }

        let path = self.map_path.clone();
        let timeout = self.config.persist_timeout();
        self.runtime.block_on(async move {
            let save = tokio::task::spawn_blocking(move || map.save(&path));
            match tokio::time::timeout(timeout, save).await {
                Ok(Ok(result)) => result.map(|()| true).map_err(BassetError::from),
                Ok(Err(e)) => Err(BassetError::Internal(e.to_string())),
                Err(_) => Err(BassetError::PersistTimeout(timeout)),
            }
        })
    }

    /// Deletes every artifact and the cache map file.
    pub fn clear_all(&self) -> ClearReport {
        let map = self.loader.map();
        let store = self.loader.store();
        let mut report = ClearReport::default();

        let removed = map.clear();
        report.entries = removed.len();

        let mut paths: BTreeSet<String> = removed.into_iter().map(|e| e.artifact_path).collect();
        match store.list_artifacts() {
            Ok(files) => paths.extend(files),
            Err(e) => warn!("Failed to list artifacts: {}", e),
        }

        for path in paths {
            if !store.exists(&path) {
                continue;
            }
            match store.delete(&path) {
                Ok(()) => report.artifacts_deleted += 1,
                Err(e) => {
                    warn!("Failed to delete {}: {}", path, e);
                    report.failures.push(path);
                }
            }
        }

        match fs::remove_file(&self.map_path) {
            Ok(()) => map.mark_clean(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => map.mark_clean(),
            Err(e) => {
                warn!("Failed to delete {}: {}", self.map_path.display(), e);
                report.failures.push(self.map_path.display().to_string());
            }
        }

        info!(
            "Cleared {} entries and {} artifacts",
            report.entries, report.artifacts_deleted
        );
        report
    }

    /// Drops the cached artifact for one reference.
    pub fn clear_one(&self, reference: &str, options: &ResolveOptions) -> bool {
        self.loader.forget(reference, options)
    }

    /// Compares the cache map with the artifacts on disk.
    pub fn check(&self) -> CheckReport {
        let store = self.loader.store();
        let entries = self.loader.map().entries();
        let mut report = CheckReport {
            entries: entries.len(),
            ..Default::default()
        };

        let mut referenced = HashSet::with_capacity(entries.len());
        for entry in entries {
            referenced.insert(entry.artifact_path.clone());
            match store.read(&entry.artifact_path) {
                Ok(bytes) if bytes.len() as u64 != entry.size_bytes => {
                    report.size_mismatches.push((entry, bytes.len() as u64));
                }
                Ok(_) => {}
                Err(_) => report.missing.push(entry),
            }
        }

        match store.list_artifacts() {
            Ok(files) => {
                report.artifacts = files.len();
                report.orphans = files
                    .into_iter()
                    .filter(|path| !referenced.contains(path))
                    .collect();
            }
            Err(e) => warn!("Failed to list artifacts: {}", e),
        }

        report
    }

    /// Every reference found in the configured views plus every source
    /// already in the cache map.
    ///
    /// Inline entries are skipped: their content only exists in the view.
    pub fn known_targets(&self) -> Result<Vec<WarmTarget>, BassetError> {
        let mut targets = BTreeSet::new();

        for entry in self.loader.map().entries() {
            match entry.kind {
                SourceKind::External | SourceKind::Local => {
                    targets.insert(WarmTarget::Reference {
                        reference: entry.source,
                        minify: entry.minify,
                    });
                }
                SourceKind::Bundle => {
                    targets.insert(WarmTarget::Bundle {
                        name: entry.source,
                        members: entry.members,
                        minify: entry.minify,
                    });
                }
                SourceKind::Inline => {}
            }
        }

        let scanner = ViewScanner::new(&self.config.views)?;
        for reference in scanner.scan(&self.config.views_root()) {
            targets.insert(WarmTarget::Reference {
                reference,
                minify: self.config.minify,
            });
        }

        Ok(targets.into_iter().collect())
    }

    /// Resolves every target. With `force`, cached artifacts are rebuilt.
    pub fn warm(&self, targets: &[WarmTarget], force: bool) -> WarmReport {
        let loader = &self.loader;
        let results: Vec<(String, Vec<Resolution>)> = self.runtime.block_on(
            stream::iter(targets)
                .map(|target| async move {
                    let resolutions = warm_one(loader, target, force).await;
                    (target.label().to_string(), resolutions)
                })
                .buffer_unordered(WARM_CONCURRENCY)
                .collect(),
        );

        let mut report = WarmReport::default();
        for (label, resolutions) in results {
            for resolution in &resolutions {
                report.record(&label, resolution);
            }
        }
        info!("Warmed {}", report);
        report
    }

    /// Pre-warms everything [`known_targets`](Self::known_targets) returns.
    pub fn cache(&self, force: bool) -> Result<WarmReport, BassetError> {
        let targets = self.known_targets()?;
        Ok(self.warm(&targets, force))
    }

    /// Clears everything, then caches every known target again.
    pub fn fresh(&self) -> Result<(ClearReport, WarmReport), BassetError> {
        let targets = self.known_targets()?;
        let cleared = self.clear_all();
        Ok((cleared, self.warm(&targets, false)))
    }

    /// Downloads every external reference again and stores a local copy.
    pub fn internalize(&self) -> Result<WarmReport, BassetError> {
        let root = self.loader.assets_root();
        let targets: Vec<WarmTarget> = self
            .known_targets()?
            .into_iter()
            .filter(|target| match target {
                WarmTarget::Reference { reference, .. } => {
                    AssetSource::parse(reference, root).is_ok_and(|s| s.is_external())
                }
                WarmTarget::Bundle { members, .. } => members
                    .iter()
                    .any(|m| AssetSource::parse(m, root).is_ok_and(|s| s.is_external())),
            })
            .collect();

        info!("Internalizing {} external asset(s)", targets.len());
        Ok(self.warm(&targets, true))
    }

    /// Logs the stats line when enabled and saves the cache map. Runs once;
    /// later calls do nothing.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.config.log_execution_time {
            info!("{}", self.stats());
        }

        match self.persist() {
            Ok(true) => debug!("Cache map saved to {}", self.map_path.display()),
            Ok(false) => debug!("Cache map unchanged"),
            Err(e) => error!("Failed to save cache map: {}", e),
        }
    }

    /// Returns a guard that terminates the manager when dropped.
    pub fn guard(&self) -> ManagerGuard<'_> {
        ManagerGuard { manager: self }
    }
}

async fn warm_one(loader: &Loader, target: &WarmTarget, force: bool) -> Vec<Resolution> {
    match target {
        WarmTarget::Reference { reference, minify } => {
            let options = ResolveOptions::new(*minify);
            let resolution = if force {
                loader.refresh(reference, &options).await
            } else {
                loader.resolve(reference, &options).await
            };
            vec![resolution]
        }
        WarmTarget::Bundle {
            name,
            members,
            minify,
        } => {
            let options = ResolveOptions::new(*minify);
            if force {
                let bundle_key = loader
                    .map()
                    .entries()
                    .into_iter()
                    .find(|e| {
                        e.kind == SourceKind::Bundle && &e.source == name && &e.members == members
                    })
                    .map(|e| e.key);
                if let Some(key) = bundle_key {
                    loader.forget_key(&key);
                }
            }
            loader
                .resolve_bundle(name, members.as_slice(), &options)
                .await
        }
    }
}

/// Terminates the wrapped [`Manager`] when dropped.
#[derive(Debug)]
pub struct ManagerGuard<'a> {
    manager: &'a Manager,
}

impl std::ops::Deref for ManagerGuard<'_> {
    type Target = Manager;

    fn deref(&self) -> &Manager {
        self.manager
    }
}

impl Drop for ManagerGuard<'_> {
    fn drop(&mut self) {
        self.manager.terminate();
    }
}
