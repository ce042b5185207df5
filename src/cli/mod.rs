//! CLI module
//!
//! Command-line interface for running the pipeline.
//!
//! # Commands
//!
//! - `run` - Run all stages, optionally on a fixed interval
//! - `ingest` / `promote` / `check` / `publish` - Run a single stage
//! - `validate` - Load and print the configuration

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
