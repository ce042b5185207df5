//! Pipeline configuration
//!
//! This module contains the configuration structures loaded from the
//! pipeline YAML file. Every field has a default matching the production
//! deployment (Whatcom County notable sightings landing in `s3://ebird-etl`),
//! so an empty file is a valid configuration.

use crate::error::{Error, Result};
use crate::http::{HttpClientConfig, RateLimiterConfig};
use crate::quality::{builtin_checks, QualityCheck};
use crate::query::PollConfig;
use crate::types::OptionStringExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

/// Unquoted SQL identifier (table and column names)
static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Database (schema) names are always quoted, so dashes are allowed
static DATABASE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]*$").unwrap());

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete pipeline configuration loaded from YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Observations API settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Object storage layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Query engine and table names
    #[serde(default)]
    pub query: QueryConfig,

    /// Data-quality gate
    #[serde(default)]
    pub quality: QualityConfig,
}

impl PipelineConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a config from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // serde_yaml rejects an empty document, treat it as all defaults
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate field values
    pub fn validate(&self) -> Result<()> {
        self.ingest.validate()?;
        self.storage.validate()?;
        self.query.validate()?;
        self.quality.validate()?;
        Ok(())
    }
}

// ============================================================================
// Ingest
// ============================================================================

/// Observations API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// eBird region code (country, state, county or location)
    #[serde(default = "default_region_code")]
    pub region_code: String,

    /// Maximum number of observations returned
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// How many days back to fetch (1-30)
    #[serde(default = "default_back_days")]
    pub back_days: u32,

    /// Environment variable holding the API token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transient HTTP failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Client-side rate limit
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            region_code: default_region_code(),
            max_results: default_max_results(),
            back_days: default_back_days(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl IngestConfig {
    /// Read the API token from the environment
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .none_if_empty()
            .ok_or_else(|| Error::missing_field(&self.api_key_env))
    }

    /// HTTP client settings for the observations API
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig::builder()
            .base_url(&self.base_url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .max_retries(self.max_retries)
            .rate_limit(RateLimiterConfig::new(
                self.requests_per_second,
                self.requests_per_second,
            ))
            .header("accept", "application/json")
            .build()
    }

    fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::missing_field("ingest.base_url"));
        }
        let base_url = url::Url::parse(&self.base_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::invalid_value(
                "ingest.base_url",
                format!("unsupported scheme '{}'", base_url.scheme()),
            ));
        }
        if self.region_code.trim().is_empty() {
            return Err(Error::missing_field("ingest.region_code"));
        }
        if !(1..=30).contains(&self.back_days) {
            return Err(Error::invalid_value(
                "ingest.back_days",
                format!("{} is outside 1..=30", self.back_days),
            ));
        }
        if !(1..=10_000).contains(&self.max_results) {
            return Err(Error::invalid_value(
                "ingest.max_results",
                format!("{} is outside 1..=10000", self.max_results),
            ));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(Error::missing_field("ingest.api_key_env"));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://api.ebird.org/v2".to_string()
}

fn default_region_code() -> String {
    // Whatcom County, WA
    "US-WA-073".to_string()
}

fn default_max_results() -> u32 {
    1000
}

fn default_back_days() -> u32 {
    7
}

fn default_api_key_env() -> String {
    "EBIRD_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_requests_per_second() -> u32 {
    5
}

// ============================================================================
// Storage
// ============================================================================

/// Object storage layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root URL (`s3://bucket[/prefix]` or a local directory)
    #[serde(default = "default_root")]
    pub root: String,

    /// Prefix for raw ingested JSON lines
    #[serde(default = "default_raw_prefix")]
    pub raw_prefix: String,

    /// File name prefix for raw objects
    #[serde(default = "default_raw_file_prefix")]
    pub raw_file_prefix: String,

    /// Location of the dev Parquet table
    #[serde(default = "default_dev_prefix")]
    pub dev_prefix: String,

    /// Parent location of the timestamped prod snapshots
    #[serde(default = "default_prod_prefix")]
    pub prod_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            raw_prefix: default_raw_prefix(),
            raw_file_prefix: default_raw_file_prefix(),
            dev_prefix: default_dev_prefix(),
            prod_prefix: default_prod_prefix(),
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        let fields = [
            ("storage.root", &self.root),
            ("storage.raw_prefix", &self.raw_prefix),
            ("storage.raw_file_prefix", &self.raw_file_prefix),
            ("storage.dev_prefix", &self.dev_prefix),
            ("storage.prod_prefix", &self.prod_prefix),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::missing_field(field));
            }
            // Locations end up inside SQL string literals
            if value.contains('\'') {
                return Err(Error::invalid_value(field, "must not contain quotes"));
            }
        }
        if self.dev_prefix.trim_matches('/') == self.prod_prefix.trim_matches('/') {
            return Err(Error::invalid_value(
                "storage.prod_prefix",
                "dev and prod locations must differ",
            ));
        }
        Ok(())
    }
}

fn default_root() -> String {
    "s3://ebird-etl".to_string()
}

fn default_raw_prefix() -> String {
    "ebird-ingest".to_string()
}

fn default_raw_file_prefix() -> String {
    "ebird-notable-obs".to_string()
}

fn default_dev_prefix() -> String {
    "ebird-parquet-dev".to_string()
}

fn default_prod_prefix() -> String {
    "ebird-parquet-prod".to_string()
}

// ============================================================================
// Query
// ============================================================================

/// Query engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// DuckDB catalog file holding the table definitions
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Database (schema) holding the pipeline tables
    #[serde(default = "default_database")]
    pub database: String,

    /// Table over the raw JSON lines
    #[serde(default = "default_raw_table")]
    pub raw_table: String,

    /// Dev Parquet table
    #[serde(default = "default_dev_table")]
    pub dev_table: String,

    /// Prod table (always points at the latest snapshot)
    #[serde(default = "default_prod_table")]
    pub prod_table: String,

    /// Partition column of the Parquet tables
    #[serde(default = "default_partition_column")]
    pub partition_column: String,

    /// Status poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum time to wait for one query
    #[serde(default = "default_query_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            database: default_database(),
            raw_table: default_raw_table(),
            dev_table: default_dev_table(),
            prod_table: default_prod_table(),
            partition_column: default_partition_column(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl QueryConfig {
    /// Poll settings for query execution
    pub fn poll_config(&self) -> PollConfig {
        PollConfig::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_secs(self.timeout_secs),
        )
    }

    fn validate(&self) -> Result<()> {
        if self.catalog_path.trim().is_empty() {
            return Err(Error::missing_field("query.catalog_path"));
        }
        if !DATABASE_REGEX.is_match(&self.database) {
            return Err(Error::invalid_value(
                "query.database",
                format!("'{}' is not a valid database name", self.database),
            ));
        }
        let identifiers = [
            ("query.raw_table", &self.raw_table),
            ("query.dev_table", &self.dev_table),
            ("query.prod_table", &self.prod_table),
            ("query.partition_column", &self.partition_column),
        ];
        for (field, value) in identifiers {
            validate_identifier(field, value)?;
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::invalid_value(
                "query.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::invalid_value(
                "query.timeout_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn default_catalog_path() -> String {
    "ebird-catalog.duckdb".to_string()
}

fn default_database() -> String {
    "ebird-db".to_string()
}

fn default_raw_table() -> String {
    "raw_ebird_ingest".to_string()
}

fn default_dev_table() -> String {
    "dev_ebird_ingest".to_string()
}

fn default_prod_table() -> String {
    "prod_ebird_ingest".to_string()
}

fn default_partition_column() -> String {
    "year_month".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_query_timeout_secs() -> u64 {
    600
}

// ============================================================================
// Quality
// ============================================================================

/// Data-quality gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Checks run in order against the dev table
    #[serde(default = "builtin_checks")]
    pub checks: Vec<QualityCheck>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            checks: builtin_checks(),
        }
    }
}

impl QualityConfig {
    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for check in &self.checks {
            if check.name.trim().is_empty() {
                return Err(Error::missing_field("quality.checks[].name"));
            }
            if check.query.trim().is_empty() {
                return Err(Error::invalid_value(
                    format!("quality.checks.{}", check.name),
                    "query cannot be empty",
                ));
            }
            if !seen.insert(check.name.as_str()) {
                return Err(Error::invalid_value(
                    "quality.checks",
                    format!("duplicate check name '{}'", check.name),
                ));
            }
        }
        Ok(())
    }
}

/// Check that a value is a plain SQL identifier
pub fn validate_identifier(field: &str, value: &str) -> Result<()> {
    if IDENTIFIER_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(Error::invalid_value(
            field,
            format!("'{value}' is not a valid SQL identifier"),
        ))
    }
}
