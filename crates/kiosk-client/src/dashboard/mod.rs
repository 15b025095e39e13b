//! Search statistics client for the kiosk dashboard.
//!
//! Talks to the backend's `/dashboard/logs` HTTP endpoints and decodes the
//! aggregated statistics and raw search logs.

pub mod types;

use std::time::Duration;

use kiosk_settings::KioskSettings;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

pub use types::{
    DailyStats, LogStats, MAX_GROUPS, NotFoundTerm, SearchGroup, SearchLog, SearchType, TopProduct,
    group_by_type_and_term,
};

/// Dashboard request failures.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Request could not be sent or the body could not be read.
    #[error("dashboard request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("dashboard request to {url} returned {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Body was not the expected JSON.
    #[error("invalid dashboard response from {url}: {source}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder error.
        source: serde_json::Error,
    },
}

/// HTTP client for the dashboard endpoints.
#[derive(Clone, Debug)]
pub struct DashboardClient {
    client: reqwest::Client,
    base_url: String,
}

impl DashboardClient {
    /// Client for the backend at `base_url` (e.g. `http://localhost:8101`).
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self, DashboardError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kiosk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url: base_url.as_ref().trim_end_matches('/').to_string() })
    }

    /// Client configured from loaded settings.
    pub fn from_settings(settings: &KioskSettings) -> Result<Self, DashboardError> {
        Self::new(
            settings.server.http_base_url(),
            Duration::from_millis(settings.dashboard.request_timeout_ms),
        )
    }

    /// Base address requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Aggregated search statistics.
    pub async fn fetch_stats(&self) -> Result<LogStats, DashboardError> {
        self.get_json(&format!("{}/dashboard/logs/stats", self.base_url)).await
    }

    /// The most recent `limit` search logs, newest first.
    pub async fn fetch_logs(&self, limit: u32) -> Result<Vec<SearchLog>, DashboardError> {
        self.get_json(&format!("{}/dashboard/logs/?limit={limit}", self.base_url)).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DashboardError> {
        debug!(url, "dashboard request");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "dashboard request rejected");
            return Err(DashboardError::Status { status: status.as_u16(), url: url.to_string() });
        }
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|source| DashboardError::Decode { url: url.to_string(), source })
    }
}
