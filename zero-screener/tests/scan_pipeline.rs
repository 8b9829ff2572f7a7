//! End-to-end scans against a scripted provider.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zero_screener::data::{DataProvider, ProviderBar, ProviderError, Timeframe};
use zero_screener::screener::{
    ProgressSink, ScanSettings, ScanStore, ScreenerDocument, ScreenerEngine, SymbolStatus,
};
use zero_screener::ScreenerError;

const DOCUMENT: &str = r#"
defaults:
  timeframes_to_test: ["2h", "1h", "1d"]
  risk_management:
    atr_period: 14
  strategies:
    trend_following:
      is_uptrend: true
      fast_vwma_above_slow: true
    bad_reference:
      proximity_check: { enabled: true, ma_column: "ema_200", proximity_pct: 5.0 }
asset_profiles:
  low_vol_profile:
    "1d": { strategy: trend_following }
  high_vol_profile:
    "1d": { strategy: trend_following }
    "1h": { strategy: trend_following }
  broken_profile:
    "1d": { strategy: bad_reference }
"#;

// ============================================================================
// Scripted provider
// ============================================================================

#[derive(Clone)]
enum Script {
    Rising(usize),
    Fail,
    Panic,
}

#[derive(Default)]
struct ScriptedProvider {
    scripts: HashMap<(String, Timeframe), Script>,
    /// Simulated latency per symbol
    delays: HashMap<String, Duration>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn script(mut self, symbol: &str, timeframe: Timeframe, script: Script) -> Self {
        self.scripts.insert((symbol.to_string(), timeframe), script);
        self
    }

    fn delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }
}

/// `n` daily bars with closes 100, 101, ... and a constant true range of 2.
fn rising(n: usize) -> Vec<ProviderBar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + i as f64;
            ProviderBar {
                timestamp: (start + ChronoDuration::days(i as i64)).fixed_offset(),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10_000.0,
            }
        })
        .collect()
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<ProviderBar>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(symbol) {
            tokio::time::sleep(*delay).await;
        }
        match self.scripts.get(&(symbol.to_string(), timeframe)) {
            Some(Script::Rising(n)) => Ok(rising(*n)),
            Some(Script::Fail) => Err(ProviderError::Unavailable("upstream down".into())),
            Some(Script::Panic) => panic!("boom while fetching {}", symbol),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<(f64, String)>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn on_progress(&self, percent: f64, message: &str) {
        let count = {
            let mut events = self.events.lock().unwrap();
            events.push((percent, message.to_string()));
            events.len()
        };
        if let Some((after, token)) = &self.cancel_after {
            if count >= *after {
                token.cancel();
            }
        }
    }
}

fn document() -> Arc<ScreenerDocument> {
    Arc::new(ScreenerDocument::from_yaml_str(DOCUMENT).unwrap())
}

fn symbols(entries: &[(&str, &str)]) -> IndexMap<String, String> {
    entries
        .iter()
        .map(|(s, p)| (s.to_string(), p.to_string()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_buy_signal_with_risk_levels() {
    let provider = Arc::new(ScriptedProvider::default().script("AAPL", Timeframe::Daily, Script::Rising(60)));
    let engine = ScreenerEngine::new(provider.clone(), document(), ScanSettings::default());

    let run = engine
        .run_scan(&symbols(&[("AAPL", "low_vol_profile")]))
        .await
        .unwrap();

    // "2h" is rejected before any request; 1h returns nothing
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

    assert_eq!(run.results.len(), 1);
    let result = &run.results[0];
    assert_eq!(result.symbol, "AAPL");
    assert_eq!(result.timeframe, Timeframe::Daily);
    assert_eq!(result.signal, "Buy (trend_following)");
    assert_eq!(result.profile, "low_vol_profile");
    assert!((result.price - 159.0).abs() < 1e-9);

    // constant true range of 2, default 1d multiple of 2.0
    let atr = result.indicators.atr.unwrap();
    assert!((atr - 2.0).abs() < 1e-9);
    assert!((result.stop_loss.unwrap() - 155.0).abs() < 1e-9);
    assert_eq!(result.take_profit, result.indicators.bollinger.middle);
    assert!(result.take_profit.is_some());

    assert_eq!(run.symbols[0].status, SymbolStatus::Signals(1));
}

#[tokio::test(start_paused = true)]
async fn test_missing_binding_yields_no_signal() {
    let provider = Arc::new(ScriptedProvider::default().script("MSFT", Timeframe::Daily, Script::Rising(60)));
    let engine = ScreenerEngine::new(provider, document(), ScanSettings::default());

    let run = engine
        .run_scan(&symbols(&[("MSFT", "micro_cap_profile")]))
        .await
        .unwrap();

    assert!(run.results.is_empty());
    assert_eq!(run.symbols[0].status, SymbolStatus::Signals(0));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_proximity_column_degrades_only_that_cell() {
    let provider = Arc::new(
        ScriptedProvider::default()
            .script("NVDA", Timeframe::Daily, Script::Rising(60))
            .script("AMD", Timeframe::Daily, Script::Rising(60)),
    );
    let engine = ScreenerEngine::new(provider, document(), ScanSettings::default());

    let run = engine
        .run_scan(&symbols(&[("NVDA", "broken_profile"), ("AMD", "low_vol_profile")]))
        .await
        .unwrap();

    assert_eq!(run.symbols[0].status, SymbolStatus::Signals(0));
    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].symbol, "AMD");
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_isolated_per_symbol() {
    let provider = Arc::new(
        ScriptedProvider::default()
            .script("TSLA", Timeframe::Daily, Script::Fail)
            .script("TSLA", Timeframe::H1, Script::Fail)
            .script("BOOM", Timeframe::H1, Script::Panic)
            .script("AAPL", Timeframe::Daily, Script::Rising(60))
            .script("SPY", Timeframe::Daily, Script::Rising(60)),
    );
    let progress = Arc::new(RecordingProgress::default());
    let engine = ScreenerEngine::new(provider, document(), ScanSettings::default())
        .with_progress(progress.clone());

    let run = engine
        .run_scan(&symbols(&[
            ("TSLA", "high_vol_profile"),
            ("BOOM", "high_vol_profile"),
            ("AAPL", "low_vol_profile"),
            ("SPY", "high_vol_profile"),
        ]))
        .await
        .unwrap();

    assert_eq!(run.total_symbols, 4);
    assert_eq!(run.symbols[0].status, SymbolStatus::NoData);
    assert!(matches!(
        &run.symbols[1].status,
        SymbolStatus::Failed(reason) if reason.contains("boom while fetching BOOM")
    ));
    assert_eq!(run.symbols[2].status, SymbolStatus::Signals(1));
    assert_eq!(run.symbols[3].status, SymbolStatus::Signals(1));

    let found: Vec<_> = run.results.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(found, vec!["AAPL", "SPY"]);

    // progress after every symbol, failures included
    let events = progress.events.lock().unwrap().clone();
    let percents: Vec<f64> = events.iter().map(|(p, _)| *p).collect();
    assert_eq!(percents, vec![25.0, 50.0, 75.0, 100.0]);
    assert_eq!(events[1].1, "Scanning BOOM...");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_scan_keeps_input_order() {
    let provider = Arc::new(
        ScriptedProvider::default()
            .script("SLOW", Timeframe::Daily, Script::Rising(40))
            .script("MID", Timeframe::Daily, Script::Rising(40))
            .script("FAST", Timeframe::Daily, Script::Rising(40))
            .delay("SLOW", Duration::from_millis(300))
            .delay("MID", Duration::from_millis(100)),
    );
    let settings = ScanSettings {
        max_concurrent_symbols: 3,
        ..ScanSettings::default()
    };
    let progress = Arc::new(RecordingProgress::default());
    let engine = ScreenerEngine::new(provider, document(), settings).with_progress(progress.clone());

    let run = engine
        .run_scan(&symbols(&[
            ("SLOW", "low_vol_profile"),
            ("MID", "low_vol_profile"),
            ("FAST", "low_vol_profile"),
        ]))
        .await
        .unwrap();

    let order: Vec<_> = run.results.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(order, vec!["SLOW", "MID", "FAST"]);

    let events = progress.events.lock().unwrap().clone();
    assert!(events.windows(2).all(|w| w[0].0 <= w[1].0));
    let messages: Vec<_> = events.iter().map(|(_, m)| m.as_str()).collect();
    assert_eq!(messages, vec!["Scanning SLOW...", "Scanning MID...", "Scanning FAST..."]);
}

#[tokio::test(start_paused = true)]
async fn test_completed_run_is_published() {
    let provider = Arc::new(ScriptedProvider::default().script("AAPL", Timeframe::Daily, Script::Rising(60)));
    let store = Arc::new(ScanStore::new());
    let engine = ScreenerEngine::new(provider, document(), ScanSettings::default())
        .with_store(store.clone());

    assert!(store.latest().is_none());
    let run = engine
        .run_scan(&symbols(&[("AAPL", "low_vol_profile")]))
        .await
        .unwrap();

    let published = store.latest().unwrap();
    assert_eq!(published.id, run.id);
    assert_eq!(published.results, run.results);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_scan_publishes_nothing() {
    let provider = Arc::new(
        ScriptedProvider::default()
            .script("AAPL", Timeframe::Daily, Script::Rising(60))
            .script("SPY", Timeframe::Daily, Script::Rising(60)),
    );
    let cancel = CancellationToken::new();
    let progress = Arc::new(RecordingProgress {
        events: Mutex::new(Vec::new()),
        cancel_after: Some((1, cancel.clone())),
    });
    let store = Arc::new(ScanStore::new());
    let engine = ScreenerEngine::new(provider, document(), ScanSettings::default())
        .with_progress(progress.clone())
        .with_store(store.clone());

    let err = engine
        .run_scan_with_cancel(
            &symbols(&[("AAPL", "low_vol_profile"), ("SPY", "low_vol_profile")]),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ScreenerError::Cancelled));
    assert!(store.latest().is_none());
    assert_eq!(progress.events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let provider = Arc::new(ScriptedProvider::default());
    let engine = ScreenerEngine::new(provider.clone(), document(), ScanSettings::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .run_scan_with_cancel(&symbols(&[("AAPL", "low_vol_profile")]), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ScreenerError::Cancelled));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_universe() {
    let engine = ScreenerEngine::new(
        Arc::new(ScriptedProvider::default()),
        document(),
        ScanSettings::default(),
    );
    let run = engine.run_scan(&IndexMap::new()).await.unwrap();
    assert_eq!(run.total_symbols, 0);
    assert!(run.results.is_empty());
}
