//! Data-quality gate
//!
//! Each check is an aggregate query returning a single `flag_count`; a
//! non-zero count stops the pipeline before anything is published.

mod checks;

pub use checks::{
    builtin_checks, parse_flag_count, run_checks, CheckOutcome, QualityCheck, QualityReport,
    FLAG_COUNT_COLUMN, TABLE_PLACEHOLDER,
};
