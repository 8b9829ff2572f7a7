//! Market data module.
//!
//! Provider boundary, retrying fetcher, and the normalized [`Series`] type
//! every later stage consumes.
//!
//! # Data Sources
//! - **Alpaca** (`alpaca`): REST bars endpoint, IEX feed by default

mod alpaca;
mod fetcher;
mod provider;

pub use alpaca::AlpacaProvider;
pub use fetcher::{MarketDataFetcher, RetryPolicy};
pub use provider::{DataProvider, ProviderError};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

use crate::error::ScreenerError;

// ============================================================================
// Timeframe
// ============================================================================

/// Bar interval. Only the enumerated tokens are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1w")]
    Weekly,
}

impl Timeframe {
    /// All supported timeframes, shortest first.
    pub const ALL: [Timeframe; 7] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::H1,
        Self::H4,
        Self::Daily,
        Self::Weekly,
    ];

    /// Configuration token (e.g. "1h").
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::Daily => "1d",
            Self::Weekly => "1w",
        }
    }

    /// Convert to the provider's timeframe representation.
    pub fn to_api_freq(&self) -> &'static str {
        match self {
            Self::M1 => "1Min",
            Self::M5 => "5Min",
            Self::M15 => "15Min",
            Self::H1 => "1Hour",
            Self::H4 => "4Hour",
            Self::Daily => "1Day",
            Self::Weekly => "1Week",
        }
    }
}

impl FromStr for Timeframe {
    type Err = ScreenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_token() == s)
            .ok_or_else(|| ScreenerError::Configuration(format!("Unsupported timeframe: {}", s)))
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_token())
    }
}

// ============================================================================
// Bars
// ============================================================================

/// A row as returned by a provider, timestamp in the provider's offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBar {
    pub timestamp: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A single OHLCV sample in UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Typical price `(high + low + close) / 3`.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// True when every OHLCV field is a finite number.
    pub fn is_complete(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl From<ProviderBar> for Bar {
    fn from(raw: ProviderBar) -> Self {
        Self {
            timestamp: raw.timestamp.with_timezone(&Utc),
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        }
    }
}

// ============================================================================
// Series
// ============================================================================

/// Normalized bars for one (symbol, timeframe).
///
/// Timestamps are UTC, unique and strictly increasing. A series cannot be
/// mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    symbol: String,
    timeframe: Timeframe,
    bars: Vec<Bar>,
}

impl Series {
    /// Build a series from bars, normalizing them.
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            bars: normalize_bars(bars),
        }
    }

    /// Build a series from raw provider rows.
    pub fn from_provider(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        rows: Vec<ProviderBar>,
    ) -> Self {
        Self::new(symbol, timeframe, rows.into_iter().map(Bar::from).collect())
    }

    /// Normalize again. Returns an identical series.
    pub fn normalize(&self) -> Self {
        Self::new(self.symbol.clone(), self.timeframe, self.bars.clone())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }
}

/// Drop duplicate timestamps (first occurrence wins) and sort ascending.
pub fn normalize_bars(bars: Vec<Bar>) -> Vec<Bar> {
    let mut seen = HashSet::with_capacity(bars.len());
    let mut unique: Vec<Bar> = bars
        .into_iter()
        .filter(|bar| seen.insert(bar.timestamp))
        .collect();
    unique.sort_by_key(|bar| bar.timestamp);
    unique
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn bar(ts: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            timestamp: ts,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test_case("1m", Timeframe::M1, "1Min")]
    #[test_case("5m", Timeframe::M5, "5Min")]
    #[test_case("15m", Timeframe::M15, "15Min")]
    #[test_case("1h", Timeframe::H1, "1Hour")]
    #[test_case("4h", Timeframe::H4, "4Hour")]
    #[test_case("1d", Timeframe::Daily, "1Day")]
    #[test_case("1w", Timeframe::Weekly, "1Week")]
    fn test_timeframe_tokens(token: &str, expected: Timeframe, api: &str) {
        let tf: Timeframe = token.parse().unwrap();
        assert_eq!(tf, expected);
        assert_eq!(tf.to_api_freq(), api);
        assert_eq!(tf.to_string(), token);
    }

    #[test_case("30m" ; "unsupported interval")]
    #[test_case("1D" ; "wrong case")]
    #[test_case("" ; "empty")]
    fn test_timeframe_rejects_unknown(token: &str) {
        let err = token.parse::<Timeframe>().unwrap_err();
        assert!(matches!(err, ScreenerError::Configuration(_)));
    }

    #[test]
    fn test_timeframe_serde_uses_tokens() {
        let json = serde_json::to_string(&Timeframe::H4).unwrap();
        assert_eq!(json, "\"4h\"");
        let tf: Timeframe = serde_json::from_str("\"1w\"").unwrap();
        assert_eq!(tf, Timeframe::Weekly);
    }

    #[test]
    fn test_normalize_dedups_keeping_first_and_sorts() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let t3 = Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap();

        let series = Series::new(
            "AAPL",
            Timeframe::Daily,
            vec![bar(t3, 3.0), bar(t1, 1.0), bar(t3, 99.0), bar(t2, 2.0)],
        );

        let closes: Vec<f64> = series.bars().iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_from_provider_converts_to_utc() {
        let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
        let ts = eastern.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
        let series = Series::from_provider(
            "MSFT",
            Timeframe::H1,
            vec![ProviderBar {
                timestamp: ts,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10.0,
            }],
        );

        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        assert_eq!(series.bars()[0].timestamp, expected);
    }

    #[test]
    fn test_same_instant_different_offsets_are_duplicates() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
        let rows = vec![
            ProviderBar {
                timestamp: utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            },
            ProviderBar {
                timestamp: eastern.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap(),
                open: 2.0,
                high: 2.0,
                low: 2.0,
                close: 2.0,
                volume: 2.0,
            },
        ];
        let series = Series::from_provider("X", Timeframe::H1, rows);
        assert_eq!(series.len(), 1);
        assert_eq!(series.bars()[0].close, 1.0);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let series = Series::new("X", Timeframe::Daily, vec![bar(t2, 2.0), bar(t1, 1.0)]);
        assert_eq!(series.normalize(), series);
    }

    #[test]
    fn test_bar_helpers() {
        let mut b = bar(Utc::now(), 10.0);
        assert!((b.typical_price() - 10.0).abs() < 1e-12);
        assert!(b.is_complete());
        b.volume = f64::NAN;
        assert!(!b.is_complete());
    }
}
