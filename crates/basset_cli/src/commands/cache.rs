//! Cache, clear, fresh and internalize commands

use std::path::Path;

use basset_core::WarmReport;
use miette::{IntoDiagnostic, Result};
use tracing::{info, warn};

use super::open_manager;

pub fn run_cache(config: Option<&Path>, force: bool) -> Result<bool> {
    let manager = open_manager(config)?;
    let manager = manager.guard();

    let report = manager.cache(force).into_diagnostic()?;
    Ok(print_warm_report(&report))
}

pub fn run_clear(config: Option<&Path>) -> Result<()> {
    let manager = open_manager(config)?;
    let manager = manager.guard();

    let report = manager.clear_all();
    for failure in &report.failures {
        warn!("Could not delete {}", failure);
    }
    println!(
        "Cleared {} cache map entries and {} artifact(s)",
        report.entries, report.artifacts_deleted
    );
    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(miette::miette!(
            "{} file(s) could not be deleted",
            report.failures.len()
        ))
    }
}

pub fn run_fresh(config: Option<&Path>) -> Result<bool> {
    let manager = open_manager(config)?;
    let manager = manager.guard();

    let (cleared, warmed) = manager.fresh().into_diagnostic()?;
    info!(
        "Cleared {} entries and {} artifact(s)",
        cleared.entries, cleared.artifacts_deleted
    );
    Ok(print_warm_report(&warmed) || !cleared.failures.is_empty())
}

pub fn run_internalize(config: Option<&Path>) -> Result<bool> {
    let manager = open_manager(config)?;
    let manager = manager.guard();

    let report = manager.internalize().into_diagnostic()?;
    Ok(print_warm_report(&report))
}

/// Prints the summary and each failure. Returns whether anything failed.
fn print_warm_report(report: &WarmReport) -> bool {
    for (reference, error) in &report.failed {
        warn!("{}: {}", reference, error);
    }
    println!("{}", report);
    !report.failed.is_empty()
}
