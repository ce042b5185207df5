//! Storage module
//!
//! Object storage access for the pipeline: landing raw JSON lines,
//! clearing table locations and reading back Parquet snapshots.

mod footer;
mod keys;
mod location;

pub use footer::{summarize_parquet, ParquetSummary};
pub use keys::{ingest_glob, ingest_key, snapshot_prefix, snapshot_timestamp, JSON_CONTENT_TYPE};
pub use location::ObjectLocation;
