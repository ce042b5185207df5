//! # ebird-etl
//!
//! A small scheduled pipeline for eBird notable-bird sightings.
//!
//! ## Stages
//!
//! 1. **Ingest**: fetch recent notable observations for a region and land
//!    them as newline-delimited JSON under a timestamped key
//! 2. **Promote**: rebuild a Snappy-compressed Parquet dev table,
//!    partitioned by `year_month`, from every raw object
//! 3. **Check**: run aggregate data-quality queries against the dev table
//! 4. **Publish**: copy dev into a timestamped prod snapshot and repoint
//!    the prod table at it
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ebird_etl::{Pipeline, PipelineConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = PipelineConfig::load("pipeline.yaml")?;
//!     let pipeline = Pipeline::from_config(config)?;
//!
//!     let report = pipeline.run().await?;
//!     println!("published in {}ms", report.duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Pipeline                            │
//! │     ingest  →  promote  →  check  →  publish                 │
//! └──────────────────────────────────────────────────────────────┘
//!          │              │          │            │
//! ┌────────┴─────┬────────┴──────────┴────────────┴──────────────┐
//! │ Observations │               Query service                   │
//! │ HTTP client  │  submit → poll (fixed interval, timeout)      │
//! │ Retry/limits │  DuckDB over JSON lines and Parquet           │
//! ├──────────────┴───────────────────────────────────────────────┤
//! │          Object storage (S3 or local filesystem)             │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the pipeline
pub mod error;

/// Common types and type aliases
pub mod types;

/// HTTP client with retry and rate limiting
pub mod http;

/// Pipeline configuration
pub mod config;

/// eBird observations API
pub mod observations;

/// Object storage access and key conventions
pub mod storage;

/// Asynchronous query execution
pub mod query;

/// Data-quality gate
pub mod quality;

/// Stage orchestration
pub mod pipeline;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineReport, StageReport};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
