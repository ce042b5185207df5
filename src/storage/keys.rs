//! Object key conventions

use chrono::{DateTime, Utc};

/// Content type of raw ingest objects
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Key of a raw ingest object
///
/// Format: `{raw_prefix}/{file_prefix}-{YYYYmmdd-HHMMSS}.json`
pub fn ingest_key(raw_prefix: &str, file_prefix: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{file_prefix}-{}.json",
        raw_prefix.trim_matches('/'),
        now.format("%Y%m%d-%H%M%S")
    )
}

/// Glob matching every raw ingest object
pub fn ingest_glob(raw_prefix: &str) -> String {
    format!("{}/*.json", raw_prefix.trim_matches('/'))
}

/// Timestamp naming a prod snapshot, e.g. `2024_01_14_10_05_00_123456`
///
/// Only `[0-9_]` so it can be used in both paths and table names.
pub fn snapshot_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y_%m_%d_%H_%M_%S_%6f").to_string()
}

/// Key prefix of one prod snapshot
pub fn snapshot_prefix(prod_prefix: &str, timestamp: &str) -> String {
    format!("{}/{timestamp}", prod_prefix.trim_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 14, 10, 5, 9).unwrap()
            + chrono::Duration::microseconds(42)
    }

    #[test]
    fn test_ingest_key() {
        assert_eq!(
            ingest_key("ebird-ingest/", "ebird-notable-obs", fixed_time()),
            "ebird-ingest/ebird-notable-obs-20240114-100509.json"
        );
    }

    #[test]
    fn test_ingest_glob() {
        assert_eq!(ingest_glob("/ebird-ingest/"), "ebird-ingest/*.json");
    }

    #[test]
    fn test_snapshot_timestamp() {
        let ts = snapshot_timestamp(fixed_time());
        assert_eq!(ts, "2024_01_14_10_05_09_000042");
        assert!(ts.chars().all(|c| c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn test_snapshot_prefix() {
        assert_eq!(
            snapshot_prefix("ebird-parquet-prod/", "2024_01_14_10_05_09_000042"),
            "ebird-parquet-prod/2024_01_14_10_05_09_000042"
        );
    }
}
