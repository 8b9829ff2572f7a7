//! Alpaca market data adapter.
//!
//! # API Documentation
//! <https://docs.alpaca.markets/reference/stockbarsingle-1>
//!
//! # Request
//! `GET /v2/stocks/{symbol}/bars` with `timeframe`, `start`, `end`,
//! `adjustment=raw`, `feed`, `limit` and `page_token`. Pages are followed
//! until `next_page_token` is absent.
//!
//! # Authentication
//! `APCA-API-KEY-ID` / `APCA-API-SECRET-KEY` headers.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use reqwest::{header, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use zero_common::config::Config;

use super::provider::{DataProvider, ProviderError};
use super::{ProviderBar, Timeframe};
use crate::error::ScreenerError;

// ============================================================================
// Constants
// ============================================================================

/// Alpaca market data base URL
pub const ALPACA_DATA_BASE: &str = "https://data.alpaca.markets";

/// Maximum bars per page accepted by the API
const PAGE_LIMIT: u32 = 10_000;

/// Upper bound on pages followed for a single request
const MAX_PAGES: usize = 100;

/// Request timeout
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    #[serde(rename = "t")]
    timestamp: DateTime<FixedOffset>,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    /// `null` when the range holds no bars
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl From<AlpacaBar> for ProviderBar {
    fn from(bar: AlpacaBar) -> Self {
        Self {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

// ============================================================================
// Alpaca Provider
// ============================================================================

/// Alpaca REST adapter for historical stock bars.
pub struct AlpacaProvider {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    secret_key: String,
    feed: String,
}

impl AlpacaProvider {
    /// Create a provider against the public data endpoint.
    pub fn new(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self::with_base_url(ALPACA_DATA_BASE, key_id, secret_key)
    }

    /// Create a provider against a custom base URL.
    pub fn with_base_url(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            secret_key: secret_key.into(),
            feed: "iex".to_string(),
        }
    }

    /// Use a different data feed ("iex", "sip").
    pub fn with_feed(mut self, feed: impl Into<String>) -> Self {
        self.feed = feed.into();
        self
    }

    /// Create from service config. Missing credentials are a configuration error.
    pub fn from_config(config: &Config) -> Result<Self, ScreenerError> {
        let (key_id, secret_key) = config
            .require_alpaca_credentials()
            .map_err(|e| ScreenerError::Configuration(e.to_string()))?;

        Ok(Self::with_base_url(&config.screener.data_base_url, key_id, secret_key)
            .with_feed(&config.screener.feed))
    }

    fn bars_url(&self, symbol: &str) -> String {
        format!("{}/v2/stocks/{}/bars", self.base_url, symbol)
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
        page_token: Option<&str>,
    ) -> Result<BarsResponse, ProviderError> {
        let mut query: Vec<(&str, String)> = vec![
            ("timeframe", timeframe.to_api_freq().to_string()),
            ("start", start.format("%Y-%m-%d").to_string()),
            ("end", end.format("%Y-%m-%d").to_string()),
            ("adjustment", "raw".to_string()),
            ("feed", self.feed.clone()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }

        let response = self
            .client
            .get(self.bars_url(symbol))
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, retry_after_secs, body));
        }

        Ok(response.json::<BarsResponse>().await?)
    }
}

/// Map a non-success HTTP status to a provider error.
fn map_status(status: StatusCode, retry_after_secs: Option<u64>, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(body),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after_secs },
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::InvalidRequest(format!("{}: {}", status, body))
        }
        s if s.is_server_error() => ProviderError::Unavailable(format!("{}: {}", status, body)),
        _ => ProviderError::Internal(format!("{}: {}", status, body)),
    }
}

#[async_trait]
impl DataProvider for AlpacaProvider {
    fn name(&self) -> &'static str {
        "alpaca"
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderBar>, ProviderError> {
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let response = self
                .fetch_page(symbol, timeframe, start, end, page_token.as_deref())
                .await?;

            let bars = response.bars.unwrap_or_default();
            debug!(symbol, %timeframe, page, bars = bars.len(), "Fetched Alpaca page");
            rows.extend(bars.into_iter().map(ProviderBar::from));

            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(rows),
            }
        }

        warn!(symbol, %timeframe, max_pages = MAX_PAGES, "Stopped following Alpaca pages");
        Ok(rows)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, None, String::new()),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, Some(5), String::new()),
            ProviderError::RateLimited {
                retry_after_secs: Some(5)
            }
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, None, String::new()),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::UNPROCESSABLE_ENTITY, None, "bad tf".into()),
            ProviderError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_bars_url_trims_trailing_slash() {
        let provider = AlpacaProvider::with_base_url("http://localhost:1234/", "k", "s");
        assert_eq!(
            provider.bars_url("AAPL"),
            "http://localhost:1234/v2/stocks/AAPL/bars"
        );
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = Config::default();
        let err = AlpacaProvider::from_config(&config).err().unwrap();
        assert!(matches!(err, ScreenerError::Configuration(_)));
    }

    #[test]
    fn test_response_with_null_bars() {
        let body = r#"{"bars": null, "symbol": "AAPL", "next_page_token": null}"#;
        let response: BarsResponse = serde_json::from_str(body).unwrap();
        assert!(response.bars.is_none());
        assert!(response.next_page_token.is_none());
    }
}
