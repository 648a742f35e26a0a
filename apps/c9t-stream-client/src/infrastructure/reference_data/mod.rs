//! Reference Data
//!
//! HTTP helpers for the instrument list and historical price series.
//! Responses are decoded into any `DeserializeOwned` type, `serde_json::Value`
//! when the caller has no schema of its own.
//!
//! # Endpoints
//!
//! - `GET {instruments_url}`
//! - `GET {historical_url}?instrumentId=..&interval=..&start=<ISO>&end=<ISO or empty>`
//!
//! Timestamps are ISO-8601 UTC with millisecond precision.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::form_urlencoded;

use crate::infrastructure::config::ReferenceDataSettings;

/// Default instrument list endpoint.
pub const DEFAULT_INSTRUMENTS_URL: &str = "https://www.cloud9trader.com/api/v1/instruments";

/// Default historical price endpoint.
pub const DEFAULT_HISTORICAL_URL: &str = "https://price.cloud9trader.com/historical";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Interval
// =============================================================================

/// Price series granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    /// Every tick.
    Tick,
    /// 5 seconds.
    S5,
    /// 10 seconds.
    S10,
    /// 2 minutes.
    M2,
    /// 5 minutes.
    M5,
    /// 10 minutes.
    M10,
    /// 15 minutes.
    M15,
    /// 30 minutes.
    M30,
    /// 1 hour.
    H1,
    /// 2 hours.
    H2,
    /// 4 hours.
    H4,
    /// 8 hours.
    H8,
    /// 12 hours.
    H12,
    /// 1 day.
    D1,
}

impl Interval {
    /// Every interval, shortest first.
    pub const ALL: [Self; 14] = [
        Self::Tick,
        Self::S5,
        Self::S10,
        Self::M2,
        Self::M5,
        Self::M10,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H2,
        Self::H4,
        Self::H8,
        Self::H12,
        Self::D1,
    ];

    /// Query string value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tick => "Tick",
            Self::S5 => "S5",
            Self::S10 => "S10",
            Self::M2 => "M2",
            Self::M5 => "M5",
            Self::M10 => "M10",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H2 => "H2",
            Self::H4 => "H4",
            Self::H8 => "H8",
            Self::H12 => "H12",
            Self::D1 => "D1",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| FetchError::InvalidInterval(s.to_string()))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Reference data errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// The request did not complete.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The body was not the expected JSON.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Unknown interval name.
    #[error("unknown interval: {0}")]
    InvalidInterval(String),
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for reference data.
#[derive(Debug, Clone)]
pub struct ReferenceDataClient {
    client: Client,
    instruments_url: String,
    historical_url: String,
}

impl ReferenceDataClient {
    /// Create a client from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &ReferenceDataSettings) -> Result<Self, FetchError> {
        Self::with_urls(&settings.instruments_url, &settings.historical_url)
    }

    /// Create a client against explicit endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_urls(instruments_url: &str, historical_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            instruments_url: instruments_url.to_string(),
            historical_url: historical_url.to_string(),
        })
    }

    /// Fetch the instrument list.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or bad JSON.
    pub async fn fetch_instruments<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        self.get_json(&self.instruments_url).await
    }

    /// Fetch a historical price series. An absent `end` means "until now".
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or bad JSON.
    pub async fn fetch_historical_price<T: DeserializeOwned>(
        &self,
        instrument_id: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<T, FetchError> {
        let url = self.historical_url_for(instrument_id, interval, start, end);
        self.get_json(&url).await
    }

    /// Full URL of a historical price query.
    #[must_use]
    pub fn historical_url_for(
        &self,
        instrument_id: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> String {
        let end = end.map(iso_millis).unwrap_or_default();
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("instrumentId", instrument_id)
            .append_pair("interval", interval.as_str())
            .append_pair("start", &iso_millis(start))
            .append_pair("end", &end)
            .finish();
        format!("{}?{query}", self.historical_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        tracing::debug!(url = %url, "Fetching reference data");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(url = %url, status = status.as_u16(), "Reference data request failed");
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// ISO-8601 UTC with millisecond precision (`2024-03-01T09:30:00.000Z`).
#[must_use]
pub fn iso_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
