//! Quality check definitions and execution

use crate::error::{Error, Result};
use crate::query::{run_query_with_results, PollConfig, QueryRequest, QueryResults, QueryService};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Placeholder replaced with the qualified table name
pub const TABLE_PLACEHOLDER: &str = "{table}";

/// Column every check query must return
pub const FLAG_COUNT_COLUMN: &str = "flag_count";

/// An aggregate query counting rows that violate a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCheck {
    /// Check name, reported on failure
    pub name: String,
    /// SQL returning a single `flag_count` column; `{table}` names the table under test
    pub query: String,
}

impl QualityCheck {
    /// Create a check
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }

    /// Query text for a concrete table
    pub fn render(&self, table: &str) -> String {
        self.query.replace(TABLE_PLACEHOLDER, table)
    }
}

fn count_where(condition: &str) -> String {
    format!(
        "SELECT SUM(CASE WHEN {condition} THEN 1 ELSE 0 END) AS {FLAG_COUNT_COLUMN} FROM {TABLE_PLACEHOLDER}"
    )
}

/// The default gate for eBird observations
pub fn builtin_checks() -> Vec<QualityCheck> {
    vec![
        QualityCheck::new("NULL_HOWMANY", count_where("howmany IS NULL")),
        QualityCheck::new("NULL_LAT_LNG", count_where("lat IS NULL OR lng IS NULL")),
        QualityCheck::new(
            "INVALID_LAT_LNG",
            count_where("lat < -90 OR lat > 90 OR lng < -180 OR lng > 180"),
        ),
        QualityCheck::new(
            "NULL_SPECIES_CODE",
            count_where("speciesCode IS NULL OR TRIM(speciesCode) = ''"),
        ),
    ]
}

/// Result of one passed check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Check name
    pub name: String,
    /// Rows flagged (always zero for a passed check)
    pub flag_count: u64,
}

/// Outcome of a full quality gate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Table the checks ran against
    pub table: String,
    /// Checks in the order they ran
    pub checks: Vec<CheckOutcome>,
}

impl QualityReport {
    /// Number of checks that ran
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether no checks ran
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

/// Read `flag_count` from the first row
///
/// A missing row or NULL (SUM over an empty table) counts as zero.
pub fn parse_flag_count(results: &QueryResults) -> Result<u64> {
    results.first_count(FLAG_COUNT_COLUMN)
}

/// Run checks in order against a table, stopping at the first failure
///
/// Any check that flags rows aborts with `Error::QualityCheckFailed`.
pub async fn run_checks(
    service: &dyn QueryService,
    checks: &[QualityCheck],
    table: &str,
    database: &str,
    poll: &PollConfig,
) -> Result<QualityReport> {
    let mut report = QualityReport {
        table: table.to_string(),
        checks: Vec::with_capacity(checks.len()),
    };

    for check in checks {
        let request = QueryRequest::new(check.render(table), database);
        let results = run_query_with_results(service, request, poll).await?;
        let flag_count = parse_flag_count(&results)?;

        if flag_count > 0 {
            return Err(Error::QualityCheckFailed {
                check: check.name.clone(),
                flag_count,
            });
        }

        info!("{} quality check passed", check.name);
        report.checks.push(CheckOutcome {
            name: check.name.clone(),
            flag_count,
        });
    }

    Ok(report)
}
