//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// eBird notable-observations pipeline
#[derive(Parser, Debug)]
#[command(name = "ebird-etl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (YAML); defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run all four stages in order
    Run {
        /// Repeat the run every N seconds until interrupted
        #[arg(long)]
        every: Option<u64>,
    },

    /// Fetch notable observations and land them in object storage
    Ingest,

    /// Rebuild the dev table from the raw data
    Promote,

    /// Run the data-quality checks against the dev table
    Check,

    /// Publish the dev table as a new prod snapshot
    Publish,

    /// Load and validate the configuration, then print it
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
