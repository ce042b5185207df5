//! eBird observation records

use crate::error::Result;
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One observation from the eBird `recent/notable` endpoint
///
/// All fields are optional: incomplete records are still landed so the
/// quality gate can count them. Fields this type does not name are kept
/// in `extra` and written back out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub species_code: Option<String>,
    pub com_name: Option<String>,
    pub sci_name: Option<String>,
    pub loc_id: Option<String>,
    pub loc_name: Option<String>,
    /// Local observation time, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD`
    pub obs_dt: Option<String>,
    /// Absent when the observer reported "X" (present, not counted)
    pub how_many: Option<u32>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub obs_valid: Option<bool>,
    pub obs_reviewed: Option<bool>,
    pub location_private: Option<bool>,
    pub sub_id: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl Observation {
    /// `YYYY-MM` partition value derived from the observation date
    pub fn year_month(&self) -> Option<&str> {
        self.obs_dt.as_deref().and_then(|dt| dt.get(..7))
    }
}

/// Distinct `YYYY-MM` months across raw records, skipping any that do not decode
pub fn year_months(records: &[JsonValue]) -> BTreeSet<String> {
    records
        .iter()
        .filter_map(|record| Observation::deserialize(record).ok())
        .filter_map(|obs| obs.year_month().map(str::to_string))
        .collect()
}

/// Encode records as newline-delimited JSON (no trailing newline)
pub fn to_json_lines<T: Serialize>(records: &[T]) -> Result<String> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}
