//! Basset CLI
//!
//! Pre-warms, inspects and clears the Basset asset cache.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use miette::Result;
use tracing::error;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(has_failures) => {
            if has_failures {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

/// Runs the selected command. `Ok(true)` means it completed but found
/// failures.
fn run(cli: &Cli) -> Result<bool> {
    let config = cli.config.as_deref();
    match &cli.command {
        Commands::Resolve {
            reference,
            no_minify,
            group,
        } => commands::resolve::run_resolve(config, reference, !*no_minify, group.as_deref()),
        Commands::Cache { force } => commands::cache::run_cache(config, *force),
        Commands::Clear => commands::cache::run_clear(config).map(|_| false),
        Commands::Check => commands::check::run_check(config),
        Commands::Install { force } => commands::install::run_install(config, *force).map(|_| false),
        Commands::Fresh => commands::cache::run_fresh(config),
        Commands::Internalize => commands::cache::run_internalize(config),
        Commands::Stats => commands::check::run_stats(config).map(|_| false),
    }
}
