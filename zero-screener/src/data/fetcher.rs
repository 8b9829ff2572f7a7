//! Retrying market data fetcher.
//!
//! Wraps a [`DataProvider`] with exponential backoff and turns provider rows
//! into a normalized [`Series`]. Provider failures never escape this layer:
//! after the last attempt the result is simply "no data".

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use zero_common::config::RetryConfig;

use super::provider::DataProvider;
use super::{Series, Timeframe};
use crate::error::ScreenerError;

// ============================================================================
// Retry Policy
// ============================================================================

/// Attempt count and doubling backoff for provider requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_secs(config.initial_delay_secs),
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1 << exponent)
    }

    /// Sum of every delay slept before the final attempt.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_after(a)).sum()
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Fetches normalized series from a provider with retries.
pub struct MarketDataFetcher<P: DataProvider + ?Sized> {
    provider: Arc<P>,
    retry: RetryPolicy,
}

impl<P: DataProvider + ?Sized> MarketDataFetcher<P> {
    pub fn new(provider: Arc<P>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fetch by timeframe token.
    ///
    /// An unsupported token fails immediately with a configuration error.
    /// `Ok(None)` means no data: empty response or retries exhausted.
    pub async fn fetch(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<Series>, ScreenerError> {
        let timeframe: Timeframe = timeframe.parse().map_err(|e| {
            error!(symbol, timeframe, "Unsupported timeframe, not fetching");
            e
        })?;

        Ok(self.fetch_timeframe(symbol, timeframe, start, end).await)
    }

    /// Fetch a parsed timeframe. Never fails; `None` means no data.
    pub async fn fetch_timeframe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<Series> {
        let max_attempts = self.retry.max_attempts.max(1);
        info!(
            symbol,
            %timeframe,
            %start,
            %end,
            provider = self.provider.name(),
            "Fetching bars"
        );

        for attempt in 1..=max_attempts {
            match self.provider.fetch_bars(symbol, timeframe, start, end).await {
                Ok(rows) if rows.is_empty() => {
                    warn!(symbol, %timeframe, attempt, "No data returned");
                    return None;
                }
                Ok(rows) => {
                    let series = Series::from_provider(symbol, timeframe, rows);
                    info!(
                        symbol,
                        %timeframe,
                        attempt,
                        bars = series.len(),
                        "Fetched bars"
                    );
                    return Some(series);
                }
                Err(err) => {
                    let delay = (attempt < max_attempts).then(|| self.retry.delay_after(attempt));
                    warn!(
                        symbol,
                        %timeframe,
                        attempt,
                        max_attempts,
                        recoverable = err.is_recoverable(),
                        delay_secs = delay.map(|d| d.as_secs_f64()),
                        error = %err,
                        "Market data request failed"
                    );
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!(
            symbol,
            %timeframe,
            attempts = max_attempts,
            "Giving up on market data after retries"
        );
        None
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
        assert_eq!(policy.delay_after(4), Duration::from_secs(16));
        assert_eq!(policy.total_backoff(), Duration::from_secs(30));
    }

    #[test]
    fn test_single_attempt_has_no_backoff() {
        let policy = RetryPolicy {
            max_attempts: 1,
            initial_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.total_backoff(), Duration::ZERO);
    }

    #[test]
    fn test_from_config_clamps_attempts() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            initial_delay_secs: 1,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
    }
}
