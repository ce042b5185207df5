//! Pipeline module
//!
//! Runs the four stages in order against one storage root and one query
//! service.
//!
//! # Overview
//!
//! - `ingest` - fetch notable observations and land them as JSON lines
//! - `promote` - rebuild the dev Parquet table from every raw object
//! - `check` - run the quality gate against the dev table
//! - `publish` - copy dev into a timestamped prod snapshot and repoint prod
//!
//! A failing stage aborts the run; earlier stages are not rolled back.

mod report;

pub use report::{PipelineReport, StageReport};

use crate::config::PipelineConfig;
use crate::error::{Error, Result, ResultExt};
use crate::observations::{to_json_lines, year_months, ObservationsClient};
use crate::quality::run_checks;
use crate::query::sql::{
    copy_partitioned, create_parquet_view, create_raw_view, dev_select, qualified_table, row_count,
    select_all,
};
use crate::query::{
    run_query, run_query_with_results, DuckDbQueryService, PollConfig, QueryExecution,
    QueryRequest, QueryService, QueryState,
};
use crate::storage::{
    ingest_glob, ingest_key, snapshot_prefix, snapshot_timestamp, summarize_parquet,
    ObjectLocation, JSON_CONTENT_TYPE,
};
use crate::types::Stage;
use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// The eBird pipeline
pub struct Pipeline {
    /// Validated configuration
    config: PipelineConfig,
    /// Storage root holding raw, dev and prod data
    location: ObjectLocation,
    /// Query engine holding the table definitions
    service: Arc<dyn QueryService>,
    /// Poll settings for every statement
    poll: PollConfig,
    /// Built on first ingest so other stages run without an API key
    observations: OnceCell<ObservationsClient>,
}

impl Pipeline {
    /// Create a pipeline from its parts
    pub fn new(
        config: PipelineConfig,
        location: ObjectLocation,
        service: Arc<dyn QueryService>,
    ) -> Self {
        let poll = config.query.poll_config();
        Self {
            config,
            location,
            service,
            poll,
            observations: OnceCell::new(),
        }
    }

    /// Open the storage root and DuckDB catalog named by the config
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let location = ObjectLocation::parse(&config.storage.root)?;
        let service = DuckDbQueryService::open(&config.query.catalog_path)?;
        if location.is_cloud() {
            service.configure_cloud_storage()?;
        }

        info!(
            "Pipeline root {} with catalog {}",
            location.root_url(),
            service.catalog_path()
        );
        Ok(Self::new(config, location, Arc::new(service)))
    }

    /// Use a prebuilt observations client
    #[must_use]
    pub fn with_observations_client(mut self, client: ObservationsClient) -> Self {
        self.observations = OnceCell::new_with(Some(client));
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the storage root
    pub fn location(&self) -> &ObjectLocation {
        &self.location
    }

    /// Get the query service
    pub fn service(&self) -> &dyn QueryService {
        self.service.as_ref()
    }

    /// Run every stage in order, stopping at the first failure
    pub async fn run(&self) -> Result<PipelineReport> {
        self.run_with(|_| {}).await
    }

    /// Run every stage in order, calling `on_stage` as each one completes
    pub async fn run_with<F>(&self, mut on_stage: F) -> Result<PipelineReport>
    where
        F: FnMut(&StageReport),
    {
        let start = Instant::now();
        let mut report = PipelineReport::new(Utc::now());

        for stage in Stage::ALL {
            let stage_report = self.run_stage(stage).await?;
            on_stage(&stage_report);
            report.push(stage_report);
        }

        report.set_duration(start.elapsed().as_millis() as u64);
        info!("Pipeline finished in {}ms", report.duration_ms);
        Ok(report)
    }

    /// Run a single stage
    pub async fn run_stage(&self, stage: Stage) -> Result<StageReport> {
        info!("Starting {} stage", stage);
        let start = Instant::now();

        let detail = match stage {
            Stage::Ingest => self.ingest().await?,
            Stage::Promote => self.promote().await?,
            Stage::Check => self.check().await?,
            Stage::Publish => self.publish().await?,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Finished {} stage in {}ms", stage, duration_ms);
        Ok(StageReport::new(stage, duration_ms, detail))
    }

    // ========================================================================
    // Stages
    // ========================================================================

    async fn ingest(&self) -> Result<serde_json::Value> {
        let ingest = &self.config.ingest;
        let storage = &self.config.storage;

        let client = self
            .observations
            .get_or_try_init(|| async { ObservationsClient::from_config(ingest) })
            .await?;

        let observations = client
            .recent_notable(&ingest.region_code, ingest.max_results, ingest.back_days)
            .await?;
        let body = to_json_lines(&observations)?;

        let key = ingest_key(&storage.raw_prefix, &storage.raw_file_prefix, Utc::now());
        let url = self
            .location
            .put(&key, Bytes::from(body), JSON_CONTENT_TYPE)
            .await?;
        info!("Landed {} observations at {}", observations.len(), url);

        Ok(json!({
            "region_code": ingest.region_code,
            "records": observations.len(),
            "year_months": year_months(&observations),
            "key": key,
            "url": url,
        }))
    }

    async fn promote(&self) -> Result<serde_json::Value> {
        let query = &self.config.query;
        let storage = &self.config.storage;
        let raw = self.table(&query.raw_table);
        let dev = self.table(&query.dev_table);

        let raw_glob = self.location.url(&ingest_glob(&storage.raw_prefix));
        self.execute(create_raw_view(&raw, &raw_glob)).await?;

        let raw_rows = self.count_rows(&raw).await?;
        if raw_rows == 0 {
            return Err(Error::query(format!(
                "No raw observations under {raw_glob}, nothing to promote"
            )));
        }

        let dev_url = self.location.url(&storage.dev_prefix);
        let removed = self
            .location
            .delete_prefix(&storage.dev_prefix)
            .await
            .with_context(|| format!("Failed to clear {dev_url}"))?;
        if removed > 0 {
            info!("Removed {} objects from {}", removed, dev_url);
        }
        self.location.ensure_dir(&storage.dev_prefix).await?;

        let copy = self
            .execute(copy_partitioned(
                &dev_select(&raw, &query.partition_column),
                &dev_url,
                &query.partition_column,
            ))
            .await?;
        self.execute(create_parquet_view(&dev, &dev_url)).await?;
        let dev_rows = self.count_rows(&dev).await?;

        Ok(json!({
            "raw_table": raw,
            "dev_table": dev,
            "location": dev_url,
            "raw_rows": raw_rows,
            "dev_rows": dev_rows,
            "copy_state": copy.state,
        }))
    }

    async fn check(&self) -> Result<serde_json::Value> {
        let query = &self.config.query;
        let dev = self.table(&query.dev_table);

        let report = run_checks(
            self.service.as_ref(),
            &self.config.quality.checks,
            &dev,
            &query.database,
            &self.poll,
        )
        .await?;
        info!("All {} data quality checks passed", report.len());

        Ok(serde_json::to_value(&report)?)
    }

    async fn publish(&self) -> Result<serde_json::Value> {
        let query = &self.config.query;
        let storage = &self.config.storage;
        let dev = self.table(&query.dev_table);

        let timestamp = snapshot_timestamp(Utc::now());
        let snapshot_key = snapshot_prefix(&storage.prod_prefix, &timestamp);
        let snapshot_url = self.location.url(&snapshot_key);

        let expected = self.count_rows(&dev).await?;
        self.location.ensure_dir(&storage.prod_prefix).await?;
        let copy = self
            .execute(copy_partitioned(
                &select_all(&dev),
                &snapshot_url,
                &query.partition_column,
            ))
            .await?;

        // Prod is only repointed at a complete snapshot
        let written = summarize_parquet(&self.location, &snapshot_key).await?;
        if written.rows != expected {
            return Err(Error::SnapshotMismatch {
                expected,
                actual: written.rows,
            });
        }

        let snapshot_table = self.table(&format!("{}_{timestamp}", query.prod_table));
        let prod = self.table(&query.prod_table);
        self.execute(create_parquet_view(&snapshot_table, &snapshot_url))
            .await?;
        self.execute(create_parquet_view(&prod, &snapshot_url))
            .await?;
        info!("{} now points at {}", prod, snapshot_url);

        Ok(json!({
            "timestamp": timestamp,
            "snapshot_table": snapshot_table,
            "prod_table": prod,
            "location": snapshot_url,
            "files": written.files,
            "rows": written.rows,
            "copy_state": copy.state,
        }))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn table(&self, name: &str) -> String {
        qualified_table(&self.config.query.database, name)
    }

    fn request(&self, sql: String) -> QueryRequest {
        QueryRequest::new(sql, &self.config.query.database)
    }

    /// Run a statement to completion
    async fn execute(&self, sql: String) -> Result<QueryExecution> {
        let execution = run_query(self.service.as_ref(), self.request(sql), &self.poll).await?;
        if execution.state == QueryState::Cancelled {
            warn!("Statement {} was cancelled, continuing", execution.id);
        }
        Ok(execution)
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let results =
            run_query_with_results(self.service.as_ref(), self.request(row_count(table)), &self.poll)
                .await?;
        results.first_count("row_count")
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("root", &self.location.root_url())
            .field("database", &self.config.query.database)
            .finish_non_exhaustive()
    }
}
