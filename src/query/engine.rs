//! DuckDB-backed query service
//!
//! DuckDB reads and writes JSON and Parquet directly on object storage
//! (via the httpfs extension for `s3://` locations), which makes it the
//! SQL-on-object-storage engine for the pipeline. Each submitted statement
//! runs on a blocking worker; executions are tracked in memory so callers
//! observe them through the same submit/poll contract as a remote service.

use super::service::QueryService;
use super::sql::{quote_identifier, quote_literal};
use super::types::{QueryExecution, QueryRequest, QueryResults, QueryState};
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use async_trait::async_trait;
use duckdb::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Tracked execution plus its rows once finished
#[derive(Debug)]
struct ExecutionEntry {
    seq: u64,
    execution: QueryExecution,
    results: Option<QueryResults>,
}

/// Finished executions kept for status and result lookups
pub const DEFAULT_HISTORY_LIMIT: usize = 256;

type Executions = Arc<Mutex<HashMap<String, ExecutionEntry>>>;

/// Query service running statements on a DuckDB catalog
pub struct DuckDbQueryService {
    /// DuckDB connection (one statement at a time)
    conn: Arc<Mutex<Connection>>,
    /// Known executions by ID
    executions: Executions,
    /// Source of execution IDs
    next_id: AtomicU64,
    /// Finished executions retained before the oldest are evicted
    history_limit: usize,
    /// Catalog path (for logging)
    catalog_path: String,
}

impl DuckDbQueryService {
    /// Open (or create) a catalog file; `:memory:` opens a throwaway catalog
    pub fn open(catalog_path: &str) -> Result<Self> {
        let conn = if catalog_path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(catalog_path)
        }
        .map_err(|e| Error::config(format!("Failed to open DuckDB catalog {catalog_path}: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            executions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            history_limit: DEFAULT_HISTORY_LIMIT,
            catalog_path: catalog_path.to_string(),
        })
    }

    /// Open an in-memory catalog
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Set how many finished executions are retained
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Catalog path this service was opened with
    pub fn catalog_path(&self) -> &str {
        &self.catalog_path
    }

    /// Load httpfs and configure S3 credentials from the environment
    pub fn configure_cloud_storage(&self) -> Result<()> {
        let conn = lock(&self.conn);

        conn.execute_batch("INSTALL httpfs; LOAD httpfs;")
            .map_err(|e| Error::config(format!("Failed to load httpfs extension: {e}")))?;

        let region = std::env::var("AWS_REGION")
            .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|_| "us-east-1".to_string());
        let mut settings = vec![format!("SET s3_region = {};", quote_literal(&region))];

        if let (Ok(key_id), Ok(secret)) = (
            std::env::var("AWS_ACCESS_KEY_ID"),
            std::env::var("AWS_SECRET_ACCESS_KEY"),
        ) {
            settings.push(format!("SET s3_access_key_id = {};", quote_literal(&key_id)));
            settings.push(format!(
                "SET s3_secret_access_key = {};",
                quote_literal(&secret)
            ));
            if let Ok(token) = std::env::var("AWS_SESSION_TOKEN") {
                settings.push(format!("SET s3_session_token = {};", quote_literal(&token)));
            }
        }

        // Custom endpoint (MinIO, LocalStack, R2)
        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT") {
            let host = endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://");
            settings.push(format!("SET s3_endpoint = {};", quote_literal(host)));
            settings.push("SET s3_url_style = 'path';".to_string());
            if endpoint.starts_with("http://") {
                settings.push("SET s3_use_ssl = false;".to_string());
            }
        }

        conn.execute_batch(&settings.join(" "))
            .map_err(|e| Error::config(format!("Failed to configure S3: {e}")))?;

        Ok(())
    }

    fn update_entry(executions: &Executions, query_id: &str, f: impl FnOnce(&mut ExecutionEntry)) {
        if let Some(entry) = lock(executions).get_mut(query_id) {
            f(entry);
        }
    }

    /// Drop the oldest finished executions beyond the history limit
    fn evict_finished(executions: &mut HashMap<String, ExecutionEntry>, limit: usize) {
        if executions.len() <= limit {
            return;
        }
        let mut finished: Vec<(u64, String)> = executions
            .iter()
            .filter(|(_, entry)| entry.execution.state.is_terminal())
            .map(|(id, entry)| (entry.seq, id.clone()))
            .collect();
        finished.sort_unstable();

        let excess = executions.len() - limit;
        for (_, id) in finished.into_iter().take(excess) {
            executions.remove(&id);
        }
    }

    fn is_cancelled(executions: &Executions, query_id: &str) -> bool {
        lock(executions)
            .get(query_id)
            .is_some_and(|entry| entry.execution.state == QueryState::Cancelled)
    }
}

impl std::fmt::Debug for DuckDbQueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbQueryService")
            .field("catalog_path", &self.catalog_path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QueryService for DuckDbQueryService {
    async fn start_query(&self, request: QueryRequest) -> Result<String> {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let query_id = format!("q-{:x}-{seq}", chrono::Utc::now().timestamp_millis());

        {
            let mut executions = lock(&self.executions);
            executions.insert(
                query_id.clone(),
                ExecutionEntry {
                    seq,
                    execution: QueryExecution::queued(&query_id),
                    results: None,
                },
            );
            Self::evict_finished(&mut executions, self.history_limit);
        }

        let conn = Arc::clone(&self.conn);
        let executions = Arc::clone(&self.executions);
        let id = query_id.clone();

        // Detached: the outcome is observed through get_query_execution
        tokio::task::spawn_blocking(move || {
            let outcome = {
                let guard = lock(&conn);

                // Stopped while waiting for the connection
                if Self::is_cancelled(&executions, &id) {
                    return;
                }
                Self::update_entry(&executions, &id, |entry| {
                    entry.execution.transition(QueryState::Running, None);
                });

                debug!("Executing query {}: {}", id, request.query);
                execute(&guard, &request)
            };
            // Release the catalog before the result becomes visible
            drop(conn);

            Self::update_entry(&executions, &id, |entry| {
                // A stop request wins over the late result
                if entry.execution.state == QueryState::Cancelled {
                    return;
                }
                match outcome {
                    Ok(results) => {
                        entry.execution.transition(QueryState::Succeeded, None);
                        entry.results = Some(results);
                    }
                    Err(e) => {
                        warn!("Query {} failed: {}", id, e);
                        entry
                            .execution
                            .transition(QueryState::Failed, Some(e.to_string()));
                    }
                }
            });
        });

        Ok(query_id)
    }

    async fn get_query_execution(&self, query_id: &str) -> Result<QueryExecution> {
        lock(&self.executions)
            .get(query_id)
            .map(|entry| entry.execution.clone())
            .ok_or_else(|| Error::QueryNotFound {
                query_id: query_id.to_string(),
            })
    }

    async fn get_query_results(&self, query_id: &str) -> Result<QueryResults> {
        let executions = lock(&self.executions);
        let entry = executions.get(query_id).ok_or_else(|| Error::QueryNotFound {
            query_id: query_id.to_string(),
        })?;

        match (&entry.execution.state, &entry.results) {
            (QueryState::Succeeded, Some(results)) => Ok(results.clone()),
            (state, _) => Err(Error::query(format!(
                "Query {query_id} has no results (state {state})"
            ))),
        }
    }

    async fn stop_query(&self, query_id: &str) -> Result<()> {
        let mut executions = lock(&self.executions);
        let entry = executions
            .get_mut(query_id)
            .ok_or_else(|| Error::QueryNotFound {
                query_id: query_id.to_string(),
            })?;

        if !entry.execution.state.is_terminal() {
            entry.execution.transition(
                QueryState::Cancelled,
                Some("Query was stopped by the client".to_string()),
            );
        }
        Ok(())
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run one statement and collect its rows
fn execute(conn: &Connection, request: &QueryRequest) -> Result<QueryResults> {
    if !request.database.is_empty() {
        conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {};",
            quote_identifier(&request.database)
        ))?;
    }

    let mut stmt = conn.prepare(&request.query)?;
    let mut rows = stmt.query([])?;
    let columns = rows
        .as_ref()
        .map(duckdb::Statement::column_names)
        .unwrap_or_default();

    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = JsonObject::new();
        for (idx, name) in columns.iter().enumerate() {
            let value: duckdb::types::Value = row.get(idx)?;
            record.insert(name.clone(), duckdb_value_to_json(value));
        }
        records.push(record);
    }

    Ok(QueryResults {
        columns,
        rows: records,
    })
}

/// Convert DuckDB Value to JSON Value
fn duckdb_value_to_json(value: duckdb::types::Value) -> JsonValue {
    use duckdb::types::Value;

    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::TinyInt(i) => JsonValue::Number(i.into()),
        Value::SmallInt(i) => JsonValue::Number(i.into()),
        Value::Int(i) => JsonValue::Number(i.into()),
        Value::BigInt(i) => JsonValue::Number(i.into()),
        // SUM over integers yields HUGEINT
        Value::HugeInt(i) => i64::try_from(i)
            .map_or_else(|_| JsonValue::String(i.to_string()), |n| JsonValue::Number(n.into())),
        Value::UTinyInt(i) => JsonValue::Number(i.into()),
        Value::USmallInt(i) => JsonValue::Number(i.into()),
        Value::UInt(i) => JsonValue::Number(i.into()),
        Value::UBigInt(i) => JsonValue::Number(i.into()),
        Value::Float(f) => {
            serde_json::Number::from_f64(f64::from(f)).map_or(JsonValue::Null, JsonValue::Number)
        }
        Value::Double(f) => serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        Value::Text(s) => JsonValue::String(s),
        Value::Blob(b) => JsonValue::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b,
        )),
        Value::Timestamp(_, micros) => {
            let secs = micros.div_euclid(1_000_000);
            let nsecs = (micros.rem_euclid(1_000_000) * 1000) as u32;
            chrono::DateTime::from_timestamp(secs, nsecs).map_or(JsonValue::Number(micros.into()), |dt| {
                JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string())
            })
        }
        Value::Date32(days) => {
            // 719163 days from 0001-01-01 to 1970-01-01
            chrono::NaiveDate::from_num_days_from_ce_opt(days + 719_163).map_or(
                JsonValue::Number(days.into()),
                |date| JsonValue::String(date.format("%Y-%m-%d").to_string()),
            )
        }
        other => JsonValue::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckdb::types::Value;

    #[test]
    fn test_duckdb_value_to_json() {
        assert_eq!(duckdb_value_to_json(Value::Null), JsonValue::Null);
        assert_eq!(duckdb_value_to_json(Value::Boolean(true)), JsonValue::Bool(true));
        assert_eq!(duckdb_value_to_json(Value::Int(42)), serde_json::json!(42));
        assert_eq!(duckdb_value_to_json(Value::HugeInt(7)), serde_json::json!(7));
        assert_eq!(
            duckdb_value_to_json(Value::HugeInt(i128::MAX)),
            JsonValue::String(i128::MAX.to_string())
        );
        assert_eq!(duckdb_value_to_json(Value::Double(48.5)), serde_json::json!(48.5));
        assert_eq!(
            duckdb_value_to_json(Value::Text("gyrfal".to_string())),
            serde_json::json!("gyrfal")
        );
        assert_eq!(
            duckdb_value_to_json(Value::Date32(0)),
            serde_json::json!("1970-01-01")
        );
    }

    #[test]
    fn test_execute_collects_rows() {
        let conn = Connection::open_in_memory().unwrap();
        let request = QueryRequest::new(
            "SELECT 1 AS a, 'x' AS b UNION ALL SELECT 2, NULL ORDER BY a",
            "",
        );

        let results = execute(&conn, &request).unwrap();

        assert_eq!(results.columns, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(results.rows.len(), 2);
        assert_eq!(results.rows[0]["b"], serde_json::json!("x"));
        assert_eq!(results.rows[1]["b"], JsonValue::Null);
    }

    #[test]
    fn test_execute_creates_database_schema() {
        let conn = Connection::open_in_memory().unwrap();
        let request = QueryRequest::new(
            "CREATE OR REPLACE VIEW \"ebird-db\".\"v\" AS SELECT 1 AS x",
            "ebird-db",
        );
        execute(&conn, &request).unwrap();

        let results = execute(
            &conn,
            &QueryRequest::new("SELECT x FROM \"ebird-db\".\"v\"", "ebird-db"),
        )
        .unwrap();
        assert_eq!(results.first_value("x"), Some(&serde_json::json!(1)));
    }
}
