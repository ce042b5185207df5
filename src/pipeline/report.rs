//! Stage and run reports

use crate::types::{JsonValue, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one completed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// Which stage ran
    pub stage: Stage,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Stage-specific details (keys written, row counts, table names)
    pub detail: JsonValue,
}

impl StageReport {
    /// Create a stage report
    pub fn new(stage: Stage, duration_ms: u64, detail: JsonValue) -> Self {
        Self {
            stage,
            duration_ms,
            detail,
        }
    }

    /// A field of the detail object
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.detail.get(key)
    }
}

/// Outcome of a full pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Completed stages in order
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    /// Start an empty report
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            stages: Vec::new(),
        }
    }

    /// Record a completed stage
    pub fn push(&mut self, report: StageReport) {
        self.stages.push(report);
    }

    /// Report for a stage, if it ran
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Set total duration
    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }
}
