//! Resolve command implementation

use std::path::Path;

use basset_core::{Outcome, ResolveOptions};
use miette::Result;
use tracing::{debug, warn};

use super::open_manager;

/// Prints the reference to render for `reference`. Returns true when the
/// asset could not be cached.
pub fn run_resolve(
    config: Option<&Path>,
    reference: &str,
    minify: bool,
    group: Option<&str>,
) -> Result<bool> {
    let manager = open_manager(config)?;
    let manager = manager.guard();

    let mut options = ResolveOptions::new(minify);
    if let Some(group) = group {
        options = options.with_group(group);
    }

    let resolution = manager.resolve_detailed(reference, &options);
    println!("{}", resolution.reference);

    match (resolution.outcome, &resolution.error) {
        (Outcome::Fallback, Some(e)) => {
            warn!("Serving {} uncached: {}", reference, e);
            Ok(true)
        }
        (Outcome::Fallback, None) => Ok(true),
        (outcome, error) => {
            debug!("{} resolved as {:?}", reference, outcome);
            if let Some(e) = error {
                warn!("{}", e);
            }
            Ok(false)
        }
    }
}
