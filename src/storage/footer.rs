//! Parquet footer inspection

use super::location::ObjectLocation;
use crate::error::Result;
use parquet::file::reader::{FileReader, SerializedFileReader};
use tracing::debug;

/// Row counts of the Parquet files under a prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParquetSummary {
    /// Number of `.parquet` objects found
    pub files: usize,
    /// Sum of the row counts recorded in their footers
    pub rows: u64,
}

/// Sum the footer row counts of every Parquet object under `prefix`
///
/// Only the footers are decoded; column data is never read.
pub async fn summarize_parquet(location: &ObjectLocation, prefix: &str) -> Result<ParquetSummary> {
    let mut summary = ParquetSummary::default();

    for key in location.list(prefix).await? {
        if !key.ends_with(".parquet") {
            continue;
        }
        let data = location.get(&key).await?;
        let reader = SerializedFileReader::new(data)?;
        let rows = reader.metadata().file_metadata().num_rows().max(0) as u64;
        debug!("{} has {} rows", key, rows);

        summary.files += 1;
        summary.rows += rows;
    }

    Ok(summary)
}
