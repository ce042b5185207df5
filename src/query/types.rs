//! Query execution types

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a submitted query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    /// Accepted, not yet running
    Queued,
    /// Executing
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
    /// Stopped before it finished
    Cancelled,
}

impl QueryState {
    /// Whether the query will not change state again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Succeeded | QueryState::Failed | QueryState::Cancelled
        )
    }

    /// Upper-case state name
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryState::Queued => "QUEUED",
            QueryState::Running => "RUNNING",
            QueryState::Succeeded => "SUCCEEDED",
            QueryState::Failed => "FAILED",
            QueryState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(QueryState::Queued),
            "RUNNING" => Ok(QueryState::Running),
            "SUCCEEDED" => Ok(QueryState::Succeeded),
            "FAILED" => Ok(QueryState::Failed),
            "CANCELLED" => Ok(QueryState::Cancelled),
            other => Err(Error::query(format!("Unknown query state: {other}"))),
        }
    }
}

/// A statement to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// SQL text (one statement)
    pub query: String,
    /// Database the statement runs in; created when missing
    pub database: String,
}

impl QueryRequest {
    /// Create a request
    pub fn new(query: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            database: database.into(),
        }
    }
}

/// Status of a submitted query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExecution {
    /// Execution ID returned by `start_query`
    pub id: String,
    /// Current state
    pub state: QueryState,
    /// Why the state last changed (error text for FAILED)
    pub state_change_reason: Option<String>,
    /// When the query was accepted
    pub submitted_at: DateTime<Utc>,
    /// When the query reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueryExecution {
    /// A freshly queued execution
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: QueryState::Queued,
            state_change_reason: None,
            submitted_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to a new state, stamping completion for terminal states
    pub fn transition(&mut self, state: QueryState, reason: Option<String>) {
        self.state = state;
        self.state_change_reason = reason;
        if state.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// Rows returned by a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResults {
    /// Column names in select order
    pub columns: Vec<String>,
    /// Rows keyed by column name
    pub rows: Vec<JsonObject>,
}

impl QueryResults {
    /// Value of a column in the first row
    pub fn first_value(&self, column: &str) -> Option<&JsonValue> {
        self.rows.first().and_then(|row| row.get(column))
    }

    /// Non-negative integer in the first row
    ///
    /// Accepts numbers and numeric strings (wide integer aggregates may
    /// arrive as text). A missing row or NULL counts as zero.
    pub fn first_count(&self, column: &str) -> Result<u64> {
        match self.first_value(column) {
            None | Some(JsonValue::Null) => Ok(0),
            Some(JsonValue::Number(n)) => n
                .as_u64()
                .ok_or_else(|| Error::query(format!("Invalid {column} value: {n}"))),
            Some(JsonValue::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| Error::query(format!("Invalid {column} value: '{s}'"))),
            Some(other) => Err(Error::query(format!("Invalid {column} value: {other}"))),
        }
    }
}
