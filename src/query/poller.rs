//! Poll-until-complete for submitted queries

use super::service::QueryService;
use super::types::{QueryExecution, QueryRequest, QueryResults, QueryState};
use crate::error::{Error, Result};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often and how long to poll a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between status requests
    pub interval: Duration,
    /// Give up after this long
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
        }
    }
}

impl PollConfig {
    /// Create a poll config
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Poll a query until it reaches a terminal state
///
/// SUCCEEDED and CANCELLED return the final execution. FAILED returns
/// `Error::QueryFailed` with the service's reason. If the timeout elapses
/// first the query is stopped and `Error::QueryTimeout` is returned.
pub async fn wait_for_query(
    service: &dyn QueryService,
    query_id: &str,
    config: &PollConfig,
) -> Result<QueryExecution> {
    let started = Instant::now();

    loop {
        let execution = service.get_query_execution(query_id).await?;
        debug!("Query {} is {}", query_id, execution.state);

        match execution.state {
            QueryState::Succeeded => return Ok(execution),
            QueryState::Cancelled => {
                warn!(
                    "Query {} was cancelled: {}",
                    query_id,
                    execution.state_change_reason.as_deref().unwrap_or("no reason given")
                );
                return Ok(execution);
            }
            QueryState::Failed => {
                return Err(Error::QueryFailed {
                    query_id: query_id.to_string(),
                    reason: execution
                        .state_change_reason
                        .unwrap_or_else(|| "no reason given".to_string()),
                });
            }
            QueryState::Queued | QueryState::Running => {}
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            if let Err(e) = service.stop_query(query_id).await {
                warn!("Failed to stop timed out query {}: {}", query_id, e);
            }
            return Err(Error::QueryTimeout {
                query_id: query_id.to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }

        tokio::time::sleep(config.interval.min(config.timeout - elapsed)).await;
    }
}

/// Submit a statement and wait for it to finish
pub async fn run_query(
    service: &dyn QueryService,
    request: QueryRequest,
    config: &PollConfig,
) -> Result<QueryExecution> {
    debug!("Submitting query: {}", request.query);
    let query_id = service.start_query(request).await?;
    wait_for_query(service, &query_id, config).await
}

/// Submit a query, wait for it and fetch its rows
///
/// A cancelled query has no rows to return, so it is an error here.
pub async fn run_query_with_results(
    service: &dyn QueryService,
    request: QueryRequest,
    config: &PollConfig,
) -> Result<QueryResults> {
    let execution = run_query(service, request, config).await?;
    if execution.state != QueryState::Succeeded {
        return Err(Error::QueryFailed {
            query_id: execution.id,
            reason: format!("query ended {} without results", execution.state),
        });
    }
    service.get_query_results(&execution.id).await
}
