//! Screener engine.
//!
//! Runs the symbol × timeframe matrix: fetch every configured timeframe for
//! a symbol, then for each series run indicators, divergence, signals and,
//! when the latest bar is a buy, risk levels.
//!
//! Failures are contained per symbol. Only an unreadable strategy document
//! (rejected before an engine exists) or cancellation ends a scan early.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use zero_common::config::ScreenerServiceConfig;
use zero_common::logging::generate_scan_id;

use crate::data::{DataProvider, MarketDataFetcher, RetryPolicy, Series, Timeframe};
use crate::divergence::DivergenceDetector;
use crate::error::ScreenerError;
use crate::indicators::{IndicatorEngine, IndicatorState};
use crate::risk::RiskCalculator;
use crate::signal::SignalEngine;

use super::config::ScreenerDocument;
use super::store::ScanStore;

// ============================================================================
// Scan Result
// ============================================================================

/// A buy signal on the latest bar of one (symbol, timeframe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Timestamp of the bar that produced the signal
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
    pub indicators: IndicatorState,
    /// Signal label, e.g. `Buy (trend_pullback)`
    pub signal: String,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Asset profile the symbol was scanned with
    pub profile: String,
}

/// How a symbol finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolStatus {
    /// At least one timeframe had data; this many buy signals
    Signals(usize),
    /// No timeframe returned data
    NoData,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub profile: String,
    pub status: SymbolStatus,
}

// ============================================================================
// Scan Run
// ============================================================================

/// One complete pass over the symbol universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub total_symbols: usize,
    /// Buy signals in symbol order, then timeframe order
    pub results: Vec<ScanResult>,
    /// Per-symbol outcome in input order
    pub symbols: Vec<SymbolReport>,
}

impl ScanRun {
    pub fn failed_symbols(&self) -> impl Iterator<Item = &SymbolReport> {
        self.symbols
            .iter()
            .filter(|s| matches!(s.status, SymbolStatus::Failed(_)))
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Scanned {} symbols in {:.1}s: {} signals, {} failed",
            self.total_symbols,
            self.duration_secs,
            self.results.len(),
            self.failed_symbols().count()
        )
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Receives progress after every symbol.
///
/// `percent` is `processed / total * 100` and never decreases within a run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_progress(&self, percent: f64, message: &str);
}

/// Progress sink that writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProgress;

#[async_trait]
impl ProgressSink for LoggingProgress {
    async fn on_progress(&self, percent: f64, message: &str) {
        info!("[{:.1}%] {}", percent, message);
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Runtime knobs of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Calendar days of history requested per fetch
    pub lookback_days: u32,
    /// Symbols processed at once; 1 is fully sequential
    pub max_concurrent_symbols: usize,
    pub retry: RetryPolicy,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            lookback_days: 90,
            max_concurrent_symbols: 1,
            retry: RetryPolicy::default(),
        }
    }
}

impl ScanSettings {
    pub fn from_config(config: &ScreenerServiceConfig) -> Self {
        Self {
            lookback_days: config.lookback_days,
            max_concurrent_symbols: config.max_concurrent_symbols.max(1),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

// ============================================================================
// Screener Engine
// ============================================================================

/// The scan orchestrator.
pub struct ScreenerEngine<P: DataProvider + ?Sized> {
    fetcher: MarketDataFetcher<P>,
    document: Arc<ScreenerDocument>,
    settings: ScanSettings,
    progress: Option<Arc<dyn ProgressSink>>,
    store: Option<Arc<ScanStore>>,
}

impl<P: DataProvider + ?Sized> ScreenerEngine<P> {
    pub fn new(provider: Arc<P>, document: Arc<ScreenerDocument>, settings: ScanSettings) -> Self {
        Self {
            fetcher: MarketDataFetcher::new(provider, settings.retry),
            document,
            settings,
            progress: None,
            store: None,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Publish every completed run to `store`.
    pub fn with_store(mut self, store: Arc<ScanStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn document(&self) -> &ScreenerDocument {
        &self.document
    }

    /// Scan `symbols` (symbol → asset profile) to completion.
    pub async fn run_scan(
        &self,
        symbols: &IndexMap<String, String>,
    ) -> Result<ScanRun, ScreenerError> {
        self.run_scan_with_cancel(symbols, &CancellationToken::new())
            .await
    }

    /// Scan `symbols`, abandoning the run when `cancel` fires.
    ///
    /// A cancelled run returns [`ScreenerError::Cancelled`] and publishes
    /// nothing.
    pub async fn run_scan_with_cancel(
        &self,
        symbols: &IndexMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<ScanRun, ScreenerError> {
        let id = generate_scan_id();
        let span = zero_common::scan_span!(id, symbols = symbols.len());
        self.scan(id, symbols, cancel).instrument(span).await
    }

    async fn scan(
        &self,
        id: String,
        symbols: &IndexMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<ScanRun, ScreenerError> {
        let started_at = Utc::now();
        let total = symbols.len();
        let end = started_at.date_naive();
        let start = end - chrono::Duration::days(i64::from(self.settings.lookback_days));
        let concurrency = self.settings.max_concurrent_symbols.max(1);

        info!(
            total,
            concurrency,
            %start,
            %end,
            timeframes = ?self.document.timeframes(),
            "Starting screener run"
        );

        // `buffered` yields in input order even when symbols finish out of order
        let tasks = stream::iter(symbols.iter())
            .map(move |(symbol, profile)| self.guarded_symbol(symbol, profile, start, end))
            .buffered(concurrency);
        futures::pin_mut!(tasks);

        let mut results = Vec::new();
        let mut reports = Vec::with_capacity(total);
        let mut processed = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(processed, total, "Scan cancelled, discarding partial results");
                    return Err(ScreenerError::Cancelled);
                }
                next = tasks.next() => next,
            };
            let Some((report, symbol_results)) = next else {
                break;
            };

            processed += 1;
            results.extend(symbol_results);

            if let Some(sink) = &self.progress {
                let percent = processed as f64 / total as f64 * 100.0;
                sink.on_progress(percent, &format!("Scanning {}...", report.symbol))
                    .await;
            }
            reports.push(report);
        }

        let completed_at = Utc::now();
        let run = ScanRun {
            id,
            started_at,
            completed_at,
            duration_secs: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            total_symbols: total,
            results,
            symbols: reports,
        };
        info!("{}", run.summary());

        if let Some(store) = &self.store {
            store.publish(run.clone());
        }
        Ok(run)
    }

    /// Process one symbol, turning errors and panics into a failed status.
    async fn guarded_symbol(
        &self,
        symbol: &str,
        profile: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> (SymbolReport, Vec<ScanResult>) {
        let outcome = AssertUnwindSafe(self.process_symbol(symbol, profile, start, end))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ScreenerError::SymbolProcessing {
                    symbol: symbol.to_string(),
                    reason: panic_message(panic.as_ref()),
                })
            });

        let (status, results) = match outcome {
            Ok((results, 0)) => {
                debug!(symbol, "No data for any timeframe");
                (SymbolStatus::NoData, results)
            }
            Ok((results, _)) => (SymbolStatus::Signals(results.len()), results),
            Err(err) => {
                error!(symbol, profile, error = %err, "Error processing symbol, skipping");
                (SymbolStatus::Failed(err.to_string()), Vec::new())
            }
        };

        let report = SymbolReport {
            symbol: symbol.to_string(),
            profile: profile.to_string(),
            status,
        };
        (report, results)
    }

    /// Returns the buy results and how many timeframes had data.
    async fn process_symbol(
        &self,
        symbol: &str,
        profile: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(Vec<ScanResult>, usize), ScreenerError> {
        let mut fetched: Vec<Series> = Vec::new();
        for token in self.document.timeframes() {
            match self.fetcher.fetch(symbol, token, start, end).await {
                Ok(Some(series)) => fetched.push(series),
                Ok(None) => {}
                Err(err) => warn!(symbol, timeframe = %token, error = %err, "Skipping timeframe"),
            }
        }

        let mut results = Vec::new();
        for series in &fetched {
            match self.process_series(series, profile) {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(err @ ScreenerError::Configuration(_)) => {
                    error!(
                        symbol,
                        profile,
                        timeframe = %series.timeframe(),
                        error = %err,
                        "Configuration error, skipping timeframe"
                    );
                }
                Err(err) => {
                    return Err(ScreenerError::SymbolProcessing {
                        symbol: symbol.to_string(),
                        reason: err.to_string(),
                    })
                }
            }
        }

        Ok((results, fetched.len()))
    }

    /// Indicator → divergence → signal → risk for one series.
    fn process_series(
        &self,
        series: &Series,
        profile: &str,
    ) -> Result<Option<ScanResult>, ScreenerError> {
        let timeframe = series.timeframe();
        let _guard = zero_common::symbol_span!(series.symbol(), timeframe).entered();
        let document = self.document.as_ref();

        let mut analyzed = IndicatorEngine::new(document.indicator_params(timeframe)).compute(series);
        if analyzed.is_empty() {
            return Ok(None);
        }
        DivergenceDetector::new(&document.defaults.divergence).detect(&mut analyzed);

        let labels = SignalEngine::new(document).evaluate(&analyzed, profile)?;
        let (Some(latest), Some(label)) = (analyzed.last(), labels.last()) else {
            return Ok(None);
        };
        if !label.is_buy() {
            return Ok(None);
        }
        let Some((_, strategy)) = document.strategy_for(profile, timeframe) else {
            return Ok(None);
        };

        let risk = RiskCalculator::new(&document.defaults.risk_management)
            .compute(latest, strategy, timeframe);

        info!(
            signal = %label,
            close = latest.bar.close,
            stop_loss = risk.stop_loss,
            take_profit = risk.take_profit,
            "Buy signal on latest bar"
        );

        Ok(Some(ScanResult {
            symbol: series.symbol().to_string(),
            timeframe,
            timestamp: latest.timestamp(),
            price: latest.bar.close,
            volume: latest.bar.volume,
            indicators: latest.indicators.clone(),
            signal: label.to_string(),
            stop_loss: risk.stop_loss,
            take_profit: risk.take_profit,
            profile: profile.to_string(),
        }))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
