//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Basset - durable caching of CDN and local front-end assets
#[derive(Parser)]
#[command(name = "basset")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve one reference and print the reference to render
    Resolve {
        /// URL or path relative to the assets directory
        reference: String,

        /// Store the asset as fetched
        #[arg(long)]
        no_minify: bool,

        /// Cache under a named group
        #[arg(long, value_name = "NAME")]
        group: Option<String>,
    },

    /// Pre-warm every asset used by the configured views
    Cache {
        /// Rebuild assets that are already cached
        #[arg(long)]
        force: bool,
    },

    /// Delete every artifact and the cache map
    Clear,

    /// Compare the cache map with the artifacts on disk
    Check,

    /// Write the default configuration and create the storage directory
    Install {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Clear, then cache again
    Fresh,

    /// Download every external asset again and keep a local copy
    Internalize,

    /// Show cache map size and call statistics
    Stats,
}
