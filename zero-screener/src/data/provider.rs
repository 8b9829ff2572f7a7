//! Data provider abstraction.
//!
//! Defines the `DataProvider` trait that market data sources implement.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

use super::{ProviderBar, Timeframe};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors raised at the provider boundary.
///
/// All of them are treated as transient by the fetcher.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Authentication error (bad or missing keys)
    Auth(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// Provider is temporarily unavailable (5xx)
    Unavailable(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Unexpected response body or internal provider error
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is likely to clear up on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Internal(format!("Failed to decode response: {}", err))
        } else {
            Self::Network(err.to_string())
        }
    }
}

// ============================================================================
// Data Provider Trait
// ============================================================================

/// Trait for market data providers.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Provider name (e.g. "alpaca")
    fn name(&self) -> &'static str;

    /// Fetch bars for a symbol between two calendar dates, inclusive.
    ///
    /// Rows may arrive unordered, duplicated, or in any UTC offset; the
    /// fetcher normalizes them. An empty vector means no data.
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderBar>, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================
