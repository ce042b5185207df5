//! Query module
//!
//! Asynchronous SQL execution against tables defined over object storage.
//!
//! # Overview
//!
//! Statements are submitted to a [`QueryService`] and observed by execution
//! ID until they reach a terminal state:
//! - `QUEUED` → `RUNNING` → `SUCCEEDED` / `FAILED`
//! - `CANCELLED` when stopped before completing
//!
//! The poller turns this into a plain `async` call with a fixed poll
//! interval and an overall timeout.

mod engine;
mod poller;
mod service;
pub mod sql;
mod types;

pub use engine::{DuckDbQueryService, DEFAULT_HISTORY_LIMIT};
pub use poller::{run_query, run_query_with_results, wait_for_query, PollConfig};
pub use service::QueryService;
pub use types::{QueryExecution, QueryRequest, QueryResults, QueryState};

#[cfg(test)]
mod tests;
