//! Observations module
//!
//! Fetches bird sightings from the eBird API and encodes them as
//! newline-delimited JSON for landing in object storage.

mod client;
mod types;

pub use client::{ObservationsClient, API_TOKEN_HEADER};
pub use types::{to_json_lines, year_months, Observation};

#[cfg(test)]
mod tests;
