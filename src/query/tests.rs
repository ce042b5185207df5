//! Tests for query module

use super::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Scripted service
// ============================================================================

/// Replays a fixed sequence of states, repeating the last one
struct ScriptedService {
    states: Mutex<VecDeque<(QueryState, Option<String>)>>,
    polls: AtomicUsize,
    stopped: AtomicUsize,
}

impl ScriptedService {
    fn new(states: &[(QueryState, Option<&str>)]) -> Self {
        Self {
            states: Mutex::new(
                states
                    .iter()
                    .map(|(state, reason)| (*state, reason.map(ToString::to_string)))
                    .collect(),
            ),
            polls: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl QueryService for ScriptedService {
    async fn start_query(&self, _request: QueryRequest) -> Result<String> {
        Ok("scripted-1".to_string())
    }

    async fn get_query_execution(&self, query_id: &str) -> Result<QueryExecution> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut states = self.states.lock().unwrap();
        let (state, reason) = if states.len() > 1 {
            states.pop_front().unwrap()
        } else {
            states.front().cloned().unwrap()
        };

        let mut execution = QueryExecution::queued(query_id);
        execution.transition(state, reason);
        Ok(execution)
    }

    async fn get_query_results(&self, _query_id: &str) -> Result<QueryResults> {
        let mut row = crate::types::JsonObject::new();
        row.insert("flag_count".to_string(), json!(0));
        Ok(QueryResults {
            columns: vec!["flag_count".to_string()],
            rows: vec![row],
        })
    }

    async fn stop_query(&self, _query_id: &str) -> Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_poll() -> PollConfig {
    PollConfig::new(Duration::from_millis(5), Duration::from_secs(5))
}

// ============================================================================
// QueryState Tests
// ============================================================================

#[test]
fn test_query_state_terminal() {
    assert!(!QueryState::Queued.is_terminal());
    assert!(!QueryState::Running.is_terminal());
    assert!(QueryState::Succeeded.is_terminal());
    assert!(QueryState::Failed.is_terminal());
    assert!(QueryState::Cancelled.is_terminal());
}

#[test]
fn test_query_state_parse_and_display() {
    assert_eq!("SUCCEEDED".parse::<QueryState>().unwrap(), QueryState::Succeeded);
    assert_eq!("cancelled".parse::<QueryState>().unwrap(), QueryState::Cancelled);
    assert!("DONE".parse::<QueryState>().is_err());
    assert_eq!(QueryState::Running.to_string(), "RUNNING");
    assert_eq!(
        serde_json::to_value(QueryState::Failed).unwrap(),
        json!("FAILED")
    );
}

#[test]
fn test_execution_transition_stamps_completion() {
    let mut execution = QueryExecution::queued("q1");
    assert!(execution.completed_at.is_none());

    execution.transition(QueryState::Running, None);
    assert!(execution.completed_at.is_none());

    execution.transition(QueryState::Failed, Some("boom".to_string()));
    assert!(execution.completed_at.is_some());
    assert_eq!(execution.state_change_reason.as_deref(), Some("boom"));
}

// ============================================================================
// Poller Tests
// ============================================================================

#[tokio::test]
async fn test_wait_polls_until_succeeded() {
    let service = ScriptedService::new(&[
        (QueryState::Queued, None),
        (QueryState::Running, None),
        (QueryState::Running, None),
        (QueryState::Succeeded, None),
    ]);

    let execution = wait_for_query(&service, "scripted-1", &fast_poll())
        .await
        .unwrap();

    assert_eq!(execution.state, QueryState::Succeeded);
    assert_eq!(service.polls.load(Ordering::SeqCst), 4);
    assert_eq!(service.stopped.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wait_failed_carries_reason() {
    let service = ScriptedService::new(&[
        (QueryState::Running, None),
        (QueryState::Failed, Some("Table not found")),
    ]);

    let err = wait_for_query(&service, "scripted-1", &fast_poll())
        .await
        .unwrap_err();

    match err {
        Error::QueryFailed { query_id, reason } => {
            assert_eq!(query_id, "scripted-1");
            assert_eq!(reason, "Table not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_wait_cancelled_returns_execution() {
    let service = ScriptedService::new(&[(QueryState::Cancelled, Some("stopped"))]);

    let execution = wait_for_query(&service, "scripted-1", &fast_poll())
        .await
        .unwrap();

    assert_eq!(execution.state, QueryState::Cancelled);
    assert_eq!(service.polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wait_timeout_stops_query() {
    let service = ScriptedService::new(&[(QueryState::Running, None)]);
    let config = PollConfig::new(Duration::from_millis(10), Duration::from_millis(50));

    let err = wait_for_query(&service, "scripted-1", &config)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::QueryTimeout { .. }));
    assert_eq!(service.stopped.load(Ordering::SeqCst), 1);
    assert!(service.polls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_run_query_with_results_rejects_cancelled() {
    let service = ScriptedService::new(&[(QueryState::Cancelled, None)]);

    let err = run_query_with_results(&service, QueryRequest::new("SELECT 1", "db"), &fast_poll())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::QueryFailed { .. }));
}

#[tokio::test]
async fn test_run_query_with_results_succeeded() {
    let service = ScriptedService::new(&[(QueryState::Running, None), (QueryState::Succeeded, None)]);

    let results = run_query_with_results(&service, QueryRequest::new("SELECT 0", "db"), &fast_poll())
        .await
        .unwrap();

    assert_eq!(results.first_value("flag_count"), Some(&json!(0)));
}

// ============================================================================
// DuckDB Service Tests
// ============================================================================

#[tokio::test]
async fn test_duckdb_service_round_trip() {
    let service = DuckDbQueryService::in_memory().unwrap();

    let results = run_query_with_results(
        &service,
        QueryRequest::new("SELECT 40 + 2 AS answer", "ebird-db"),
        &fast_poll(),
    )
    .await
    .unwrap();

    assert_eq!(results.columns, vec!["answer".to_string()]);
    assert_eq!(results.first_value("answer"), Some(&json!(42)));
}

#[tokio::test]
async fn test_duckdb_service_reports_failure() {
    let service = DuckDbQueryService::in_memory().unwrap();

    let err = run_query(
        &service,
        QueryRequest::new("SELECT * FROM \"ebird-db\".\"missing_table\"", "ebird-db"),
        &fast_poll(),
    )
    .await
    .unwrap_err();

    match err {
        Error::QueryFailed { reason, .. } => assert!(reason.contains("missing_table")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_duckdb_service_unknown_query() {
    let service = DuckDbQueryService::in_memory().unwrap();

    let err = service.get_query_execution("nope").await.unwrap_err();
    assert!(matches!(err, Error::QueryNotFound { .. }));
    assert!(service.stop_query("nope").await.is_err());
}

#[tokio::test]
async fn test_duckdb_service_evicts_oldest_finished_executions() {
    let service = DuckDbQueryService::in_memory().unwrap().with_history_limit(2);

    let mut ids = Vec::new();
    for n in 0..4 {
        let execution = run_query(&service, QueryRequest::new(format!("SELECT {n}"), ""), &fast_poll())
            .await
            .unwrap();
        ids.push(execution.id);
    }

    for id in &ids[..2] {
        assert!(matches!(
            service.get_query_execution(id).await.unwrap_err(),
            Error::QueryNotFound { .. }
        ));
    }
    assert!(service.get_query_results(&ids[2]).await.is_ok());
    assert!(service.get_query_results(&ids[3]).await.is_ok());
}

#[tokio::test]
async fn test_duckdb_service_stop_after_finish_is_noop() {
    let service = DuckDbQueryService::in_memory().unwrap();

    let execution = run_query(&service, QueryRequest::new("SELECT 1", ""), &fast_poll())
        .await
        .unwrap();
    service.stop_query(&execution.id).await.unwrap();

    let after = service.get_query_execution(&execution.id).await.unwrap();
    assert_eq!(after.state, QueryState::Succeeded);
    assert!(service.get_query_results(&execution.id).await.is_ok());
}

#[tokio::test]
async fn test_duckdb_service_persists_views_in_catalog() {
    let temp_dir = tempfile::tempdir().unwrap();
    let catalog = temp_dir.path().join("catalog.duckdb");
    let catalog = catalog.to_str().unwrap();

    {
        let service = DuckDbQueryService::open(catalog).unwrap();
        run_query(
            &service,
            QueryRequest::new(
                "CREATE OR REPLACE VIEW \"ebird-db\".\"v\" AS SELECT 7 AS n",
                "ebird-db",
            ),
            &fast_poll(),
        )
        .await
        .unwrap();
    }

    let service = DuckDbQueryService::open(catalog).unwrap();
    let results = run_query_with_results(
        &service,
        QueryRequest::new("SELECT n FROM \"ebird-db\".\"v\"", "ebird-db"),
        &fast_poll(),
    )
    .await
    .unwrap();
    assert_eq!(results.first_value("n"), Some(&json!(7)));
}
