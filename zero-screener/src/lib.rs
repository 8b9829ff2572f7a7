//! Zero Screener Library
//!
//! Scans a universe of symbols across several timeframes, computes technical
//! indicators per (symbol, timeframe) and emits buy signals when the
//! strategy bound to the symbol's asset profile is satisfied.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        zero-screener                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  raw bars ──► Series ──► IndicatorState ──► divergence flags        │
//! │                                   │                                 │
//! │                                   ▼                                 │
//! │                     signal label + risk levels ──► ScanRun          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Pipeline
//!
//! - **Data acquisition** ([`data`]): provider boundary, retry with doubling
//!   backoff, and series normalization (UTC, dedup, ascending order)
//! - **Indicator engine** ([`indicators`]): VWMA, average volume, StochRSI,
//!   Bollinger bands on the slow VWMA, ATR. Windows shrink to the data
//!   available instead of failing.
//! - **Divergence detector** ([`divergence`]): prominence/distance pivots on
//!   price lows and the oscillator, regular bullish divergence
//! - **Signal engine** ([`signal`]): typed predicates folded per strategy
//! - **Risk calculator** ([`risk`]): ATR-based stop-loss and take-profit
//! - **Orchestrator** ([`screener`]): symbol × timeframe matrix, per-symbol
//!   fault isolation, progress reporting, atomic publication of results

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod divergence;
pub mod error;
pub mod indicators;
pub mod risk;
pub mod screener;
pub mod signal;

pub use data::{Bar, DataProvider, MarketDataFetcher, ProviderError, RetryPolicy, Series, Timeframe};
pub use divergence::DivergenceDetector;
pub use error::{Result, ScreenerError};
pub use indicators::{AnalyzedBar, AnalyzedSeries, IndicatorColumn, IndicatorEngine, IndicatorState};
pub use risk::{RiskCalculator, RiskLevels};
pub use screener::{
    LoggingProgress, ProgressSink, ScanReport, ScanResult, ScanRun, ScanSettings, ScanStore,
    ScreenerDocument, ScreenerEngine, SymbolStatus,
};
pub use signal::{Predicate, SignalEngine, SignalLabel, Strategy};
