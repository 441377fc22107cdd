//! Check and stats commands

use std::path::Path;

use miette::Result;

use super::open_manager;

/// Returns true when the cache is inconsistent.
pub fn run_check(config: Option<&Path>) -> Result<bool> {
    let manager = open_manager(config)?;
    let manager = manager.guard();

    let report = manager.check();
    print!("{}", report);
    Ok(!report.is_consistent())
}

pub fn run_stats(config: Option<&Path>) -> Result<()> {
    let manager = open_manager(config)?;
    let manager = manager.guard();

    let map = manager.loader().map();
    println!("Cache map: {}", manager.map_path().display());
    println!("Entries: {}", map.len());
    println!("{}", manager.stats());
    Ok(())
}
