//! Basset configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use jsonc_parser::ParseOptions;
use jsonschema::Validator;
use serde::{Deserialize, Serialize};

use crate::BassetError;
use crate::disk::Visibility;

// Embed the schema
const SCHEMA_JSON: &str = include_str!("../../../schemas/v1/config.json");
static CONFIG_SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Contents written by `basset install`.
pub const DEFAULT_CONFIG: &str = r#"{
  // Where artifacts are stored and how they are served.
  "disk": {
    "root": "storage/app/public",
    "url": "/storage",
    "visibility": "public"
  },
  // Subdirectory of the disk that holds Basset artifacts.
  "path": "basset",
  // Directory that local asset references are resolved against.
  "assets_dir": "public",
  "cache_map": true,
  "minify": true,
  "verify_fingerprints": true,
  "log_execution_time": false,
  // Templates scanned by `basset cache`.
  "views": ["resources/views/**/*.html"]
}
"#;

/// Configuration for Basset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BassetConfig {
    /// Disk the artifacts are written to.
    #[serde(default)]
    pub disk: DiskConfig,

    /// Subdirectory of the disk that holds artifacts and the cache map.
    #[serde(default = "default_path")]
    pub path: String,

    /// Whether the cache map is loaded at startup and saved at shutdown.
    #[serde(default = "default_true")]
    pub cache_map: bool,

    /// Overrides the cache map location (default `<disk root>/<path>/.basset`).
    #[serde(default)]
    pub cache_map_path: Option<String>,

    /// Directory local references are resolved against.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// Minify scripts and styles by default.
    #[serde(default = "default_true")]
    pub minify: bool,

    /// Re-check local sources against their fingerprint on every resolve.
    #[serde(default = "default_true")]
    pub verify_fingerprints: bool,

    /// Log invocation count and cumulative time at shutdown.
    #[serde(default)]
    pub log_execution_time: bool,

    /// Glob patterns of templates scanned for asset references.
    #[serde(default)]
    pub views: Vec<String>,

    /// Network settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Upper bound on the shutdown save.
    #[serde(default = "default_persist_timeout")]
    pub persist_timeout_secs: u64,

    /// Base directory for resolving relative paths.
    /// This is usually the directory containing the configuration file.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Disk settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskConfig {
    #[serde(default = "default_disk_root")]
    pub root: String,
    #[serde(default = "default_disk_url")]
    pub url: String,
    #[serde(default)]
    pub visibility: Visibility,
}

/// Network settings for external assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Permit loopback and private hosts (development and tests).
    #[serde(default)]
    pub allow_local: bool,
    #[serde(default = "default_max_size")]
    pub max_size: u64,
}

fn default_true() -> bool {
    true
}

fn default_path() -> String {
    "basset".to_string()
}

fn default_assets_dir() -> String {
    "public".to_string()
}

fn default_disk_root() -> String {
    "storage/app/public".to_string()
}

fn default_disk_url() -> String {
    "/storage".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    2
}

fn default_max_size() -> u64 {
    10 * 1024 * 1024
}

fn default_persist_timeout() -> u64 {
    5
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            root: default_disk_root(),
            url: default_disk_url(),
            visibility: Visibility::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            retries: default_retries(),
            allow_local: false,
            max_size: default_max_size(),
        }
    }
}

impl BassetConfig {
    /// Config file names, in discovery order.
    pub const CONFIG_FILES: &'static [&'static str] =
        &["basset.jsonc", ".basset.jsonc", "basset.json"];

    /// Creates a configuration with every default.
    pub fn new() -> Self {
        Self {
            disk: DiskConfig::default(),
            path: default_path(),
            cache_map: true,
            cache_map_path: None,
            assets_dir: default_assets_dir(),
            minify: true,
            verify_fingerprints: true,
            log_execution_time: false,
            views: Vec::new(),
            fetch: FetchConfig::default(),
            persist_timeout_secs: default_persist_timeout(),
            base_dir: None,
        }
    }

    /// Finds the first config file in `dir`.
    pub fn discover(dir: impl AsRef<Path>) -> Option<PathBuf> {
        let dir = dir.as_ref();
        Self::CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Loads configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BassetError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| BassetError::config(format!("Failed to read config: {}", e)))?;

        let mut config = Self::from_jsonc(&content)?;

        if let Some(parent) = path.parent() {
            config.base_dir = Some(parent.to_path_buf());
        }

        Ok(config)
    }

    /// Parses configuration from JSONC with schema validation.
    pub fn from_jsonc(content: &str) -> Result<Self, BassetError> {
        let value = jsonc_parser::parse_to_serde_value(content, &ParseOptions::default())
            .map_err(|e| BassetError::config(format!("Invalid JSON: {}", e)))?
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let schema = CONFIG_SCHEMA.get_or_init(|| {
            let schema_json: serde_json::Value =
                serde_json::from_str(SCHEMA_JSON).expect("Invalid embedded config schema");
            Validator::new(&schema_json).expect("Invalid config schema compilation")
        });

        if let Err(e) = schema.validate(&value) {
            return Err(BassetError::config(format!(
                "Config validation failed: {} at {}",
                e,
                e.instance_path()
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| BassetError::config(format!("Invalid config: {}", e)))
    }

    /// Resolves a configured path against the config file's directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Root directory of the disk.
    pub fn disk_root(&self) -> PathBuf {
        self.resolve_path(&self.disk.root)
    }

    /// Directory local references are resolved against.
    pub fn assets_root(&self) -> PathBuf {
        self.resolve_path(&self.assets_dir)
    }

    /// Location of the persisted cache map.
    pub fn cache_map_file(&self) -> PathBuf {
        match &self.cache_map_path {
            Some(path) => self.resolve_path(path),
            None => self.disk_root().join(&self.path).join(".basset"),
        }
    }

    /// Directory the view globs are matched under.
    pub fn views_root(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Timeout for a single HTTP request.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    /// Upper bound on the shutdown save.
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_secs(self.persist_timeout_secs)
    }

    /// Computes a hash of the configuration, logged to tell runs apart.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

impl Default for BassetConfig {
    fn default() -> Self {
        Self::new()
    }
}
