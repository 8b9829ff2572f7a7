//! Indicator engine.
//!
//! Computes per-bar indicator state for a normalized series. Every window is
//! clamped to the number of bars available, so short series yield undefined
//! fields instead of errors. Undefined is `None`, never `0.0`.

mod atr;
mod bollinger;
mod stoch_rsi;
mod vwma;

pub use atr::atr;
pub use bollinger::{bollinger, BollingerBands};
pub use stoch_rsi::{rsi, stoch_rsi, StochRsiLengths};
pub use vwma::{rolling_mean, vwma};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::data::{Bar, Series, Timeframe};
use crate::error::ScreenerError;

// ============================================================================
// Indicator State
// ============================================================================

/// Indicator values attached to one bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorState {
    pub vwma_fast: Option<f64>,
    pub vwma_slow: Option<f64>,
    pub avg_volume: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub atr: Option<f64>,
    pub bollinger: BollingerBands,
    pub bullish_divergence: bool,
    /// Always false for now; kept so the schema is stable.
    pub bearish_divergence: bool,
}

/// A bar with its indicator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedBar {
    #[serde(flatten)]
    pub bar: Bar,
    #[serde(flatten)]
    pub indicators: IndicatorState,
}

impl AnalyzedBar {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.bar.timestamp
    }

    /// Value of a named column at this bar.
    pub fn value(&self, column: IndicatorColumn) -> Option<f64> {
        let ind = &self.indicators;
        match column {
            IndicatorColumn::Open => Some(self.bar.open),
            IndicatorColumn::High => Some(self.bar.high),
            IndicatorColumn::Low => Some(self.bar.low),
            IndicatorColumn::Close => Some(self.bar.close),
            IndicatorColumn::Volume => Some(self.bar.volume),
            IndicatorColumn::VwmaFast => ind.vwma_fast,
            IndicatorColumn::VwmaSlow => ind.vwma_slow,
            IndicatorColumn::AvgVolume => ind.avg_volume,
            IndicatorColumn::StochK => ind.stoch_k,
            IndicatorColumn::StochD => ind.stoch_d,
            IndicatorColumn::Atr => ind.atr,
            IndicatorColumn::LowerBb => ind.bollinger.lower,
            IndicatorColumn::MiddleBb => ind.bollinger.middle,
            IndicatorColumn::UpperBb => ind.bollinger.upper,
        }
        .filter(|v| v.is_finite())
    }
}

/// Bars of one (symbol, timeframe) with indicator state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzedSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: Vec<AnalyzedBar>,
}

impl AnalyzedSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, bars: Vec<AnalyzedBar>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&AnalyzedBar> {
        self.bars.last()
    }
}

// ============================================================================
// Indicator Column
// ============================================================================

/// A named numeric column of an [`AnalyzedBar`].
///
/// Configuration refers to columns by name (`proximity_check.ma_column`,
/// `divergence.oscillator`); parsing here rejects names that do not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorColumn {
    Open,
    High,
    Low,
    Close,
    Volume,
    VwmaFast,
    VwmaSlow,
    AvgVolume,
    StochK,
    StochD,
    Atr,
    LowerBb,
    MiddleBb,
    UpperBb,
}

impl IndicatorColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::Volume => "volume",
            Self::VwmaFast => "vwma_fast",
            Self::VwmaSlow => "vwma_slow",
            Self::AvgVolume => "avg_volume",
            Self::StochK => "stoch_k",
            Self::StochD => "stoch_d",
            Self::Atr => "atr",
            Self::LowerBb => "lower_bb",
            Self::MiddleBb => "middle_bb",
            Self::UpperBb => "upper_bb",
        }
    }
}

impl FromStr for IndicatorColumn {
    type Err = ScreenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let column = match s {
            "open" => Self::Open,
            "high" => Self::High,
            "low" => Self::Low,
            "close" => Self::Close,
            "volume" => Self::Volume,
            "vwma_fast" => Self::VwmaFast,
            "vwma_slow" => Self::VwmaSlow,
            "avg_volume" => Self::AvgVolume,
            "stoch_k" => Self::StochK,
            "stoch_d" => Self::StochD,
            "atr" => Self::Atr,
            "lower_bb" => Self::LowerBb,
            "middle_bb" => Self::MiddleBb,
            "upper_bb" => Self::UpperBb,
            other => {
                return Err(ScreenerError::Configuration(format!(
                    "Unknown indicator column: {}",
                    other
                )))
            }
        };
        Ok(column)
    }
}

impl std::fmt::Display for IndicatorColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Indicator Engine
// ============================================================================

/// Configured lengths for one timeframe, before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub vwma_fast: usize,
    pub vwma_slow: usize,
    pub volume_lookback: usize,
    pub stoch_rsi: StochRsiLengths,
    pub buy_bb_stddev: f64,
    pub sell_bb_stddev: f64,
    pub atr_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            vwma_fast: 10,
            vwma_slow: 20,
            volume_lookback: 20,
            stoch_rsi: StochRsiLengths::default(),
            buy_bb_stddev: 2.0,
            sell_bb_stddev: 2.0,
            atr_period: 14,
        }
    }
}

/// Window lengths actually used for a series of `n` bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveWindows {
    pub vwma_fast: usize,
    pub vwma_slow: usize,
    pub volume_lookback: usize,
    /// `None` when the series is too short for ATR (fewer than two bars)
    pub atr_period: Option<usize>,
}

impl IndicatorParams {
    /// Clamp every window to `min(configured, n)`; ATR to `min(configured, n - 1)`.
    pub fn effective_windows(&self, n: usize) -> EffectiveWindows {
        let clamp = |w: usize| w.min(n).max(1);
        EffectiveWindows {
            vwma_fast: clamp(self.vwma_fast),
            vwma_slow: clamp(self.vwma_slow),
            volume_lookback: clamp(self.volume_lookback),
            atr_period: (n >= 2).then(|| self.atr_period.min(n - 1).max(1)),
        }
    }
}

/// Computes [`IndicatorState`] for every bar of a series.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// Compute all indicators. Divergence flags start out false.
    pub fn compute(&self, series: &Series) -> AnalyzedSeries {
        let bars = series.bars();
        let n = bars.len();
        let windows = self.params.effective_windows(n);

        let vwma_slow = vwma(bars, windows.vwma_slow);
        let vwma_fast = vwma(bars, windows.vwma_fast);
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let avg_volume = rolling_mean(&volumes, windows.volume_lookback);

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let (stoch_k, stoch_d) = stoch_rsi(&closes, self.params.stoch_rsi);

        let bands = bollinger(
            &vwma_slow,
            windows.vwma_slow,
            self.params.buy_bb_stddev,
            self.params.sell_bb_stddev,
        );

        let atr_values = match windows.atr_period {
            Some(period) => atr(bars, period),
            None => vec![None; n],
        };

        let analyzed: Vec<AnalyzedBar> = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| AnalyzedBar {
                bar: bar.clone(),
                indicators: IndicatorState {
                    vwma_fast: vwma_fast[i],
                    vwma_slow: vwma_slow[i],
                    avg_volume: avg_volume[i],
                    stoch_k: stoch_k[i],
                    stoch_d: stoch_d[i],
                    atr: atr_values[i],
                    bollinger: bands[i],
                    bullish_divergence: false,
                    bearish_divergence: false,
                },
            })
            .filter(|analyzed| analyzed.bar.is_complete())
            .collect();

        debug!(
            symbol = series.symbol(),
            timeframe = %series.timeframe(),
            bars = n,
            kept = analyzed.len(),
            vwma_slow = windows.vwma_slow,
            vwma_fast = windows.vwma_fast,
            atr_period = windows.atr_period,
            "Indicators calculated"
        );

        AnalyzedSeries::new(series.symbol(), series.timeframe(), analyzed)
    }
}

// ============================================================================
// Tests
// ============================================================================
