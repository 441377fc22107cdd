//! # basset_core
//!
//! Resolves front-end asset references (external URLs, local files, inline
//! blocks and bundles) to durably cached, optionally minified artifacts.
//!
//! A [`Manager`] owns everything for one process: it loads the cache map on
//! [`Manager::open`], resolves references through the [`Loader`], and saves
//! the map on [`Manager::terminate`].

pub mod config;
pub mod directives;
pub mod disk;
mod error;
pub mod flight;
pub mod loader;
pub mod manager;
pub mod report;
pub mod scanner;
pub mod stats;
pub mod store;
pub mod transform;

pub use config::{BassetConfig, DEFAULT_CONFIG, DiskConfig, FetchConfig};
pub use directives::Directives;
pub use disk::{Disk, LocalDisk, Visibility};
pub use error::{AssetError, BassetError};
pub use loader::{Loader, Outcome, ResolveOptions, Resolution};
pub use manager::{Manager, ManagerGuard, WarmTarget};
pub use report::{CheckReport, ClearReport, WarmReport};
pub use scanner::ViewScanner;
pub use stats::{LoaderStats, StatsSnapshot};
pub use store::ArtifactStore;
