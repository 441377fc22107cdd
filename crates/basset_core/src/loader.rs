//! Resolves asset references to cached artifacts.
//!
//! Each resolution walks CHECK_CACHE, FETCH_OR_READ, TRANSFORM and STORE.
//! No step returns an error to the caller: when an asset cannot be served
//! from a fresh artifact the caller gets a usable fallback reference and the
//! failure is recorded on the [`Resolution`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use basset_cache::{AssetKey, CacheEntry, CacheMap, Lookup, SourceKind, fingerprint};
use basset_fetch::{AssetSource, FetchError, HttpClient, read_local};
use tracing::{debug, info, warn};

use crate::error::AssetError;
use crate::flight::KeyedLocks;
use crate::stats::LoaderStats;
use crate::store::ArtifactStore;
use crate::transform::{self, AssetType};

/// Per-call transform parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Minify scripts and styles.
    pub minify: bool,
    /// Bundle group the asset belongs to, if any.
    pub group: Option<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            minify: true,
            group: None,
        }
    }
}

impl ResolveOptions {
    pub fn new(minify: bool) -> Self {
        Self {
            minify,
            group: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Canonical rendering mixed into the asset key.
    pub fn params(&self) -> String {
        format!(
            "minify={};group={}",
            u8::from(self.minify),
            self.group.as_deref().unwrap_or_default()
        )
    }
}

/// How a resolution was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Served from an existing artifact.
    Hit,
    /// Produced and cached during this call.
    Stored,
    /// Not cached; the reference points at the original source.
    Fallback,
}

/// Result of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The reference to render.
    pub reference: String,
    /// Key of the asset, when the reference could be parsed.
    pub key: Option<AssetKey>,
    pub outcome: Outcome,
    /// What went wrong, if anything. A `TransformFailed` error may accompany
    /// a `Stored` outcome.
    pub error: Option<AssetError>,
}

impl Resolution {
    /// Whether the reference points at a cached artifact.
    pub fn is_cached(&self) -> bool {
        self.outcome != Outcome::Fallback
    }
}

enum Input {
    Single(AssetSource),
    Bundle(Vec<AssetSource>),
}

/// Everything needed to cache one artifact, derived before any I/O.
struct Plan {
    key: AssetKey,
    source: String,
    kind: SourceKind,
    members: Vec<String>,
    ext: Option<String>,
    minify: bool,
}

type Failure = (AssetKey, AssetError);

/// The asset loader.
#[derive(Debug)]
pub struct Loader {
    map: Arc<CacheMap>,
    store: ArtifactStore,
    http: HttpClient,
    assets_root: PathBuf,
    max_size: u64,
    verify_fingerprints: bool,
    stats: LoaderStats,
    locks: KeyedLocks,
}

impl Loader {
    pub fn new(
        map: Arc<CacheMap>,
        store: ArtifactStore,
        http: HttpClient,
        assets_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            map,
            store,
            http,
            assets_root: assets_root.into(),
            max_size: basset_fetch::http_client::DEFAULT_MAX_SIZE,
            verify_fingerprints: true,
            stats: LoaderStats::new(),
            locks: KeyedLocks::new(),
        }
    }

    /// Enables or disables re-fingerprinting local sources on every resolve.
    pub fn with_verify_fingerprints(mut self, verify: bool) -> Self {
        self.verify_fingerprints = verify;
        self
    }

    /// Sets the largest local file that will be read.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn map(&self) -> &Arc<CacheMap> {
        &self.map
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn stats(&self) -> &LoaderStats {
        &self.stats
    }

    pub fn assets_root(&self) -> &Path {
        &self.assets_root
    }

    /// Resolves a URL or local path to the reference templates should render.
    pub async fn resolve(&self, reference: &str, options: &ResolveOptions) -> Resolution {
        let _timer = self.stats.start_call();
        self.resolve_reference(reference, options, false).await
    }

    /// Like [`resolve`](Self::resolve), but ignores any cached artifact and
    /// rebuilds it.
    pub async fn refresh(&self, reference: &str, options: &ResolveOptions) -> Resolution {
        let _timer = self.stats.start_call();
        self.resolve_reference(reference, options, true).await
    }

    /// Caches a literal block of code.
    ///
    /// `name` only supplies the extension. On failure the reference is
    /// empty and the caller should render the content inline.
    pub async fn resolve_inline(
        &self,
        name: &str,
        content: &str,
        options: &ResolveOptions,
    ) -> Resolution {
        let _timer = self.stats.start_call();
        let source = AssetSource::inline(name, content);
        let plan = plan_single(name, &source, options);
        match self.run(plan, Input::Single(source), false).await {
            Ok(resolution) => resolution,
            Err((key, error)) => self.fallback(String::new(), Some(key), error),
        }
    }

    /// Concatenates `references` into one artifact named `name`.
    ///
    /// On success a single resolution is returned. If any member cannot be
    /// loaded the members are resolved one by one instead, so the page still
    /// gets every asset.
    pub async fn resolve_bundle(
        &self,
        name: &str,
        references: &[impl AsRef<str>],
        options: &ResolveOptions,
    ) -> Vec<Resolution> {
        let _timer = self.stats.start_call();
        if references.is_empty() {
            return Vec::new();
        }

        let sources: Result<Vec<AssetSource>, FetchError> = references
            .iter()
            .map(|r| AssetSource::parse(r.as_ref(), &self.assets_root))
            .collect();

        match sources {
            Ok(sources) => {
                let members = references.iter().map(|r| r.as_ref().to_string()).collect();
                let plan = plan_bundle(name, members, &sources, options);
                match self.run(plan, Input::Bundle(sources), false).await {
                    Ok(resolution) => return vec![resolution],
                    Err((_, error)) => {
                        warn!("Bundle {} unavailable ({}), resolving members", name, error)
                    }
                }
            }
            Err(e) => warn!("Bundle {} has an invalid member ({}), resolving members", name, e),
        }

        let mut resolutions = Vec::with_capacity(references.len());
        for reference in references {
            resolutions.push(self.resolve_reference(reference.as_ref(), options, false).await);
        }
        resolutions
    }

    /// Computes the key `reference` would be cached under.
    pub fn key_for(&self, reference: &str, options: &ResolveOptions) -> Result<AssetKey, FetchError> {
        let source = AssetSource::parse(reference, &self.assets_root)?;
        Ok(plan_single(reference, &source, options).key)
    }

    /// Drops the cached artifact for `reference`. Returns whether one existed.
    pub fn forget(&self, reference: &str, options: &ResolveOptions) -> bool {
        match self.key_for(reference, options) {
            Ok(key) => self.forget_key(&key),
            Err(e) => {
                debug!("Nothing to forget for {}: {}", reference, e);
                false
            }
        }
    }

    /// Removes the entry for `key` and deletes its artifact.
    pub fn forget_key(&self, key: &AssetKey) -> bool {
        let Some(entry) = self.map.remove(key) else {
            return false;
        };
        if let Err(e) = self.store.delete(&entry.artifact_path) {
            warn!("Failed to delete artifact {}: {}", entry.artifact_path, e);
        }
        true
    }

    async fn resolve_reference(
        &self,
        reference: &str,
        options: &ResolveOptions,
        force: bool,
    ) -> Resolution {
        let source = match AssetSource::parse(reference, &self.assets_root) {
            Ok(source) => source,
            Err(e) => {
                warn!("Cannot resolve {}: {}", reference, e);
                return self.fallback(
                    reference.to_string(),
                    None,
                    AssetError::SourceUnavailable(e.to_string()),
                );
            }
        };

        let plan = plan_single(reference, &source, options);
        match self.run(plan, Input::Single(source), force).await {
            Ok(resolution) => resolution,
            Err((key, error)) => self.fallback(reference.to_string(), Some(key), error),
        }
    }

    async fn run(&self, plan: Plan, input: Input, force: bool) -> Result<Resolution, Failure> {
        // CHECK_CACHE
        let live = if self.verify_fingerprints {
            self.live_fingerprint(&input).await
        } else {
            None
        };
        if !force && let Some(hit) = self.cached(&plan.key, live.as_deref()) {
            return Ok(hit);
        }

        let _flight = self.locks.lock(&plan.key).await;
        if !force && let Some(hit) = self.cached(&plan.key, live.as_deref()) {
            return Ok(hit);
        }
        self.stats.record_miss();
        debug!("Loading {} ({})", plan.source, plan.kind.as_str());

        // FETCH_OR_READ
        let fetched = match self.fetch(&input).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Failed to load {}: {}", plan.source, e);
                return Err((plan.key, AssetError::SourceUnavailable(e.to_string())));
            }
        };
        let source_fingerprint = fingerprint_of(&input, &fetched);

        // TRANSFORM
        let asset_type = AssetType::from_extension(plan.ext.as_deref());
        let raw = match input {
            Input::Single(_) => fetched.into_iter().next().unwrap_or_default(),
            Input::Bundle(_) => transform::concat(asset_type, &fetched),
        };
        let revision = fingerprint(&raw);
        let (bytes, transformed, error) = match transform::transform(asset_type, &raw, plan.minify)
        {
            Ok(bytes) => (bytes, true, None),
            Err(e) => {
                warn!("Failed to minify {}: {}; caching it unminified", plan.source, e);
                self.stats.record_transform_failure();
                (raw, false, Some(AssetError::TransformFailed(e.to_string())))
            }
        };

        // STORE
        let size = bytes.len() as u64;
        let path = match self.write_artifact(&plan, revision, bytes, force).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Failed to store {}: {}; serving it uncached", plan.source, e);
                return Err((plan.key, AssetError::StoreWriteFailed(e.to_string())));
            }
        };

        let entry = CacheEntry::new(
            plan.key.clone(),
            plan.source.clone(),
            plan.kind,
            path.clone(),
            source_fingerprint,
            size,
        )
        .with_members(plan.members)
        .with_minify(plan.minify)
        .with_transformed(transformed);
        let previous = self.map.get(&plan.key);
        self.map.put(plan.key.clone(), entry);
        info!("Cached {} at {}", plan.source, path);

        if let Some(previous) = previous
            && previous.artifact_path != path
        {
            debug!("Removing superseded artifact {}", previous.artifact_path);
            if let Err(e) = self.store.delete(&previous.artifact_path) {
                warn!("Failed to delete {}: {}", previous.artifact_path, e);
            }
        }

        Ok(Resolution {
            reference: self.store.public_reference(&path),
            key: Some(plan.key),
            outcome: Outcome::Stored,
            error,
        })
    }

    fn cached(&self, key: &AssetKey, live_fingerprint: Option<&str>) -> Option<Resolution> {
        let lookup = self
            .map
            .lookup(key, live_fingerprint, |entry| self.store.exists(&entry.artifact_path));
        match lookup {
            Lookup::Hit(entry) => {
                self.stats.record_hit();
                Some(Resolution {
                    reference: self.store.public_reference(&entry.artifact_path),
                    key: Some(entry.key),
                    outcome: Outcome::Hit,
                    error: None,
                })
            }
            Lookup::Missing | Lookup::ArtifactMissing(_) | Lookup::Stale(_) => None,
        }
    }

    /// Writes the artifact off the runtime. Only a forced rebuild overwrites
    /// an existing file.
    async fn write_artifact(
        &self,
        plan: &Plan,
        revision: String,
        bytes: Vec<u8>,
        force: bool,
    ) -> io::Result<String> {
        let store = self.store.clone();
        let key = plan.key.clone();
        let ext = plan.ext.clone();

        tokio::task::spawn_blocking(move || {
            if force {
                store.replace(&key, &revision, ext.as_deref(), &bytes)
            } else {
                store.write(&key, &revision, ext.as_deref(), &bytes)
            }
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn fetch(&self, input: &Input) -> Result<Vec<Vec<u8>>, FetchError> {
        match input {
            Input::Single(source) => Ok(vec![self.read_source(source).await?]),
            Input::Bundle(sources) => {
                let mut fetched = Vec::with_capacity(sources.len());
                for source in sources {
                    fetched.push(self.read_source(source).await?);
                }
                Ok(fetched)
            }
        }
    }

    async fn read_source(&self, source: &AssetSource) -> Result<Vec<u8>, FetchError> {
        match source {
            AssetSource::External(url) => self.http.fetch(url).await,
            AssetSource::Local(path) => read_local(path, self.max_size).await,
            AssetSource::Inline { content, .. } => Ok(content.as_bytes().to_vec()),
        }
    }

    /// Fingerprint of the source as it is now, for sources where that is
    /// cheap to observe. `None` means the cached entry is trusted.
    async fn live_fingerprint(&self, input: &Input) -> Option<String> {
        match input {
            Input::Single(AssetSource::Local(path)) => read_local(path, self.max_size)
                .await
                .ok()
                .map(|bytes| fingerprint(&bytes)),
            Input::Single(_) => None,
            Input::Bundle(sources) => {
                let mut parts = Vec::with_capacity(sources.len());
                for source in sources {
                    let part = match source {
                        AssetSource::Local(path) => {
                            fingerprint(&read_local(path, self.max_size).await.ok()?)
                        }
                        AssetSource::External(url) => url.to_string(),
                        AssetSource::Inline { content, .. } => fingerprint(content.as_bytes()),
                    };
                    parts.push(part);
                }
                Some(combine(&parts))
            }
        }
    }

    fn fallback(&self, reference: String, key: Option<AssetKey>, error: AssetError) -> Resolution {
        self.stats.record_fallback();
        Resolution {
            reference,
            key,
            outcome: Outcome::Fallback,
            error: Some(error),
        }
    }
}

fn source_kind(source: &AssetSource) -> SourceKind {
    match source {
        AssetSource::External(_) => SourceKind::External,
        AssetSource::Local(_) => SourceKind::Local,
        AssetSource::Inline { .. } => SourceKind::Inline,
    }
}

fn plan_single(reference: &str, source: &AssetSource, options: &ResolveOptions) -> Plan {
    let kind = source_kind(source);
    Plan {
        key: AssetKey::derive(kind.as_str(), &source.identity(), &options.params()),
        source: reference.to_string(),
        kind,
        members: Vec::new(),
        ext: source.extension(),
        minify: options.minify,
    }
}

fn plan_bundle(
    name: &str,
    members: Vec<String>,
    sources: &[AssetSource],
    options: &ResolveOptions,
) -> Plan {
    let member_keys: Vec<String> = sources
        .iter()
        .map(|s| AssetKey::derive(source_kind(s).as_str(), &s.identity(), "").to_string())
        .collect();
    let options = options.clone().with_group(name);
    let ext = Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .or_else(|| sources.first().and_then(AssetSource::extension));

    Plan {
        key: AssetKey::derive(
            SourceKind::Bundle.as_str(),
            member_keys.join("\n").as_bytes(),
            &options.params(),
        ),
        source: name.to_string(),
        kind: SourceKind::Bundle,
        members,
        ext,
        minify: options.minify,
    }
}

fn fingerprint_of(input: &Input, fetched: &[Vec<u8>]) -> String {
    match input {
        Input::Single(_) => fetched.first().map(|b| fingerprint(b)).unwrap_or_default(),
        Input::Bundle(sources) => {
            let parts: Vec<String> = sources
                .iter()
                .zip(fetched)
                .map(|(source, bytes)| match source {
                    AssetSource::External(url) => url.to_string(),
                    AssetSource::Local(_) | AssetSource::Inline { .. } => fingerprint(bytes),
                })
                .collect();
            combine(&parts)
        }
    }
}

fn combine(parts: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::LocalDisk;
    use pretty_assertions::assert_eq;
    use tempfile::{TempDir, tempdir};

    fn loader(dir: &TempDir) -> Loader {
        let disk = LocalDisk::new(dir.path().join("storage"), "/storage");
        let store = ArtifactStore::new(Arc::new(disk), "basset");
        let http = HttpClient::builder().allow_local(true).build().unwrap();
        std::fs::create_dir_all(dir.path().join("public")).unwrap();
        Loader::new(Arc::new(CacheMap::new()), store, http, dir.path().join("public"))
    }

    #[test]
    fn test_params_are_canonical() {
        assert_eq!(ResolveOptions::default().params(), "minify=1;group=");
        assert_eq!(
            ResolveOptions::new(false).with_group("app").params(),
            "minify=0;group=app"
        );
    }

    #[test]
    fn test_key_depends_on_options() {
        let dir = tempdir().unwrap();
        let loader = loader(&dir);
        let minified = loader.key_for("app.js", &ResolveOptions::new(true)).unwrap();
        let raw = loader.key_for("app.js", &ResolveOptions::new(false)).unwrap();
        assert_ne!(minified, raw);
        assert_eq!(loader.key_for("app.js", &ResolveOptions::new(true)).unwrap(), minified);
    }

    #[tokio::test]
    async fn test_resolve_local_then_hit() {
        let dir = tempdir().unwrap();
        let loader = loader(&dir);
        std::fs::write(dir.path().join("public/app.css"), "a {  color: red; }").unwrap();

        let first = loader.resolve("app.css", &ResolveOptions::default()).await;
        assert_eq!(first.outcome, Outcome::Stored);
        assert!(first.reference.starts_with("/storage/basset/"));
        assert!(first.reference.ends_with(".css"));

        let second = loader.resolve("app.css", &ResolveOptions::default()).await;
        assert_eq!(second.outcome, Outcome::Hit);
        assert_eq!(second.reference, first.reference);

        let entry = loader.map().get(first.key.as_ref().unwrap()).unwrap();
        assert_eq!(loader.store().read(&entry.artifact_path).unwrap(), b"a{color:red}");
        assert_eq!(entry.kind, SourceKind::Local);
        assert_eq!(entry.source, "app.css");
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_reference() {
        let dir = tempdir().unwrap();
        let loader = loader(&dir);

        let resolution = loader.resolve("missing.js", &ResolveOptions::default()).await;
        assert_eq!(resolution.outcome, Outcome::Fallback);
        assert_eq!(resolution.reference, "missing.js");
        assert!(matches!(resolution.error, Some(AssetError::SourceUnavailable(_))));
        assert!(loader.map().is_empty());
        assert_eq!(loader.stats().snapshot().fallbacks, 1);
    }

    #[tokio::test]
    async fn test_invalid_reference_falls_back() {
        let dir = tempdir().unwrap();
        let loader = loader(&dir);

        let resolution = loader.resolve("../secrets.js", &ResolveOptions::default()).await;
        assert_eq!(resolution.outcome, Outcome::Fallback);
        assert_eq!(resolution.reference, "../secrets.js");
        assert_eq!(resolution.key, None);
    }

    #[tokio::test]
    async fn test_transform_failure_stores_raw_source() {
        let dir = tempdir().unwrap();
        let loader = loader(&dir);
        std::fs::write(dir.path().join("public/broken.js"), "var s = 'open").unwrap();

        let resolution = loader.resolve("broken.js", &ResolveOptions::default()).await;
        assert_eq!(resolution.outcome, Outcome::Stored);
        assert!(matches!(resolution.error, Some(AssetError::TransformFailed(_))));

        let entry = loader.map().get(resolution.key.as_ref().unwrap()).unwrap();
        assert!(!entry.transformed);
        assert_eq!(loader.store().read(&entry.artifact_path).unwrap(), b"var s = 'open");
        assert_eq!(loader.stats().snapshot().transform_failures, 1);
    }

    #[tokio::test]
    async fn test_inline_block() {
        let dir = tempdir().unwrap();
        let loader = loader(&dir);

        let resolution = loader
            .resolve_inline("block.js", "console.log( 1 );", &ResolveOptions::default())
            .await;
        assert_eq!(resolution.outcome, Outcome::Stored);

        let entry = loader.map().get(resolution.key.as_ref().unwrap()).unwrap();
        assert_eq!(entry.kind, SourceKind::Inline);
        assert_eq!(loader.store().read(&entry.artifact_path).unwrap(), b"console.log(1);");

        let again = loader
            .resolve_inline("other.js", "console.log( 1 );", &ResolveOptions::default())
            .await;
        assert_eq!(again.outcome, Outcome::Hit);
    }

    #[tokio::test]
    async fn test_bundle_concatenates_members() {
        let dir = tempdir().unwrap();
        let loader = loader(&dir);
        std::fs::write(dir.path().join("public/a.js"), "var a = 1").unwrap();
        std::fs::write(dir.path().join("public/b.js"), "var b = 2").unwrap();

        let resolutions = loader
            .resolve_bundle("app.js", &["a.js", "b.js"], &ResolveOptions::default())
            .await;
        assert_eq!(resolutions.len(), 1);
        assert_eq!(resolutions[0].outcome, Outcome::Stored);

        let entry = loader.map().get(resolutions[0].key.as_ref().unwrap()).unwrap();
        assert_eq!(entry.kind, SourceKind::Bundle);
        assert_eq!(entry.members, vec!["a.js", "b.js"]);
        assert_eq!(loader.store().read(&entry.artifact_path).unwrap(), b"var a=1;var b=2");
        assert_eq!(loader.stats().snapshot().total_calls, 1);
    }

    #[tokio::test]
    async fn test_bundle_with_missing_member_resolves_members() {
        let dir = tempdir().unwrap();
        let loader = loader(&dir);
        std::fs::write(dir.path().join("public/a.js"), "var a = 1").unwrap();

        let resolutions = loader
            .resolve_bundle("app.js", &["a.js", "gone.js"], &ResolveOptions::default())
            .await;
        assert_eq!(resolutions.len(), 2);
        assert_eq!(resolutions[0].outcome, Outcome::Stored);
        assert_eq!(resolutions[1].outcome, Outcome::Fallback);
        assert_eq!(resolutions[1].reference, "gone.js");
    }

    #[tokio::test]
    async fn test_refresh_rebuilds_and_forget_removes() {
        let dir = tempdir().unwrap();
        let loader = loader(&dir);
        std::fs::write(dir.path().join("public/app.js"), "var a = 1").unwrap();
        let options = ResolveOptions::default();

        loader.resolve("app.js", &options).await;
        let refreshed = loader.refresh("app.js", &options).await;
        assert_eq!(refreshed.outcome, Outcome::Stored);
        assert_eq!(loader.stats().snapshot().misses, 2);

        let entry = loader.map().get(refreshed.key.as_ref().unwrap()).unwrap();
        assert!(loader.forget("app.js", &options));
        assert!(!loader.store().exists(&entry.artifact_path));
        assert!(!loader.forget("app.js", &options));
        assert!(loader.map().is_empty());
    }
}
