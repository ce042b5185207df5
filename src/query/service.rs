//! Query service trait

use super::types::{QueryExecution, QueryRequest, QueryResults};
use crate::error::Result;
use async_trait::async_trait;

/// An asynchronous SQL service
///
/// Queries are submitted and then observed by ID: `start_query` returns as
/// soon as the statement is accepted, and callers poll
/// `get_query_execution` until the state is terminal.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Submit a statement, returning its execution ID
    async fn start_query(&self, request: QueryRequest) -> Result<String>;

    /// Current status of an execution
    async fn get_query_execution(&self, query_id: &str) -> Result<QueryExecution>;

    /// Rows of a SUCCEEDED execution
    async fn get_query_results(&self, query_id: &str) -> Result<QueryResults>;

    /// Request cancellation; a no-op for executions already finished
    async fn stop_query(&self, query_id: &str) -> Result<()>;
}
