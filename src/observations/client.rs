//! eBird API client

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use serde_json::Value;
use tracing::debug;

/// Header carrying the eBird API token
pub const API_TOKEN_HEADER: &str = "X-eBirdApiToken";

/// Client for the eBird observations endpoints
pub struct ObservationsClient {
    http: HttpClient,
    api_key: String,
}

impl ObservationsClient {
    /// Create a client from an HTTP client and API token
    pub fn new(http: HttpClient, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
        }
    }

    /// Build a client from the ingest config, reading the token from the environment
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        let http = HttpClient::with_config(config.http_client_config())?;
        Ok(Self::new(http, api_key))
    }

    /// Recent notable observations in a region, as returned by the API
    ///
    /// Only the most recent observation of each species is returned, going
    /// back at most `back_days` (1-30) days. Records are not decoded, so
    /// they land exactly as received.
    pub async fn recent_notable(
        &self,
        region_code: &str,
        max_results: u32,
        back_days: u32,
    ) -> Result<Vec<Value>> {
        let path = format!("/data/obs/{region_code}/recent/notable");
        let request = RequestConfig::new()
            .query("maxResults", max_results)
            .query("back", back_days)
            .header(API_TOKEN_HEADER, self.api_key.as_str());

        let body: Value = self.http.get_json_with_config(&path, request).await?;
        let Value::Array(items) = body else {
            return Err(Error::decode(format!(
                "Expected a JSON array of observations from {path}"
            )));
        };

        debug!("Received {} observations for {}", items.len(), region_code);
        Ok(items)
    }
}

impl std::fmt::Debug for ObservationsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationsClient")
            .field("http", &self.http)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
