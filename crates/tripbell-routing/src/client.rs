//! HTTP routing client.
//!
//! Endpoints (all `GET`):
//! - `/gtfs/age` → plain-text age of the loaded schedule data in seconds
//! - `/gtfs/fetch-url?q=<feed>` → reload the schedule feed (200 or 202)
//! - `/routing?from=&to=&time=&departure=` → JSON itinerary
//! - `/search/area?q=&count=` → JSON list of locations

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use tripbell_core::config::RoutingConfig;
use tripbell_core::error::{Result, TripbellError};
use tripbell_core::traits::RoutingClient;
use tripbell_core::types::{Itinerary, Location};

/// Routing service client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRoutingClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRoutingClient {
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TripbellError::Routing(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(&config.base_url, client))
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        self.client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| TripbellError::Routing(format!("GET {path} failed: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let resp = self.get(path, query).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TripbellError::Routing(format!("GET {path} → {status}: {body}")));
        }
        resp.json()
            .await
            .map_err(|e| TripbellError::Routing(format!("Invalid {path} response: {e}")))
    }

    /// Free-text search for stops and areas.
    pub async fn search_areas(&self, query: &str, count: usize) -> Result<Vec<Location>> {
        let count = count.to_string();
        self.get_json("/search/area", &[("q", query), ("count", &count)])
            .await
    }
}

#[async_trait]
impl RoutingClient for HttpRoutingClient {
    async fn data_age(&self) -> Result<u32> {
        let resp = self.get("/gtfs/age", &[]).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TripbellError::Routing(format!("GET /gtfs/age → {status}")));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| TripbellError::Routing(format!("Failed to read age: {e}")))?;
        body.trim()
            .parse::<u32>()
            .map_err(|e| TripbellError::Routing(format!("Failed to parse age '{}': {e}", body.trim())))
    }

    async fn trigger_refresh(&self, source_url: &str) -> Result<()> {
        let resp = self.get("/gtfs/fetch-url", &[("q", source_url)]).await?;
        match resp.status() {
            StatusCode::OK | StatusCode::ACCEPTED => {
                tracing::debug!("🔄 Refresh accepted for {source_url}");
                Ok(())
            }
            status => Err(TripbellError::Routing(format!(
                "Failed to trigger refresh, status: {status}"
            ))),
        }
    }

    async fn routing(
        &self,
        from_id: &str,
        to_id: &str,
        time: &str,
        departure: bool,
    ) -> Result<Itinerary> {
        let departure = if departure { "true" } else { "false" };
        self.get_json(
            "/routing",
            &[("from", from_id), ("to", to_id), ("time", time), ("departure", departure)],
        )
        .await
    }
}
