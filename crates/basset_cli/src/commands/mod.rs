//! Command implementations

pub mod cache;
pub mod check;
pub mod install;
pub mod resolve;

use std::path::Path;

use basset_core::{BassetConfig, Manager};
use miette::{IntoDiagnostic, Result};
use tracing::{debug, warn};

/// Loads the config given with `--config`, or the first one found in the
/// working directory, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<BassetConfig> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => BassetConfig::discover(std::env::current_dir().into_diagnostic()?),
    };

    match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            BassetConfig::from_file(&path).into_diagnostic()
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(BassetConfig::new())
        }
    }
}

pub fn open_manager(path: Option<&Path>) -> Result<Manager> {
    let manager = Manager::open(load_config(path)?).into_diagnostic()?;
    if let Some(e) = manager.load_error() {
        warn!("Starting with an empty cache map: {}", e);
    }
    Ok(manager)
}
