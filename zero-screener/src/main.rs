//! Zero Screener - one-shot multi-timeframe stock scan.
//!
//! Loads the service config and strategy document, scans the configured
//! symbol universe once, prints a Markdown report and optionally writes
//! Markdown and JSON reports to `screener.report_dir`.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zero_common::config::Config;
use zero_common::logging::init_from_config;
use zero_screener::data::AlpacaProvider;
use zero_screener::screener::{
    LoggingProgress, ReportFormat, ScanReport, ScanSettings, ScanStore, ScreenerDocument,
    ScreenerEngine,
};

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load_with_env().context("Failed to load configuration")?;
    init_from_config(&config.observability);

    tracing::info!("Zero Screener v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("Invalid configuration")?;

    let document_path = config.screener.document_path();
    let document = ScreenerDocument::load(&document_path)
        .with_context(|| format!("Cannot start scan without {}", document_path.display()))?;

    let provider = Arc::new(AlpacaProvider::from_config(&config)?);
    let store = Arc::new(ScanStore::new());
    let engine = ScreenerEngine::new(
        provider,
        Arc::new(document),
        ScanSettings::from_config(&config.screener),
    )
    .with_progress(Arc::new(LoggingProgress))
    .with_store(Arc::clone(&store));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling scan");
            on_signal.cancel();
        }
    });

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        symbols = config.screener.symbols.len(),
        "Screener initialized in {:?}",
        startup_duration
    );

    let run = engine
        .run_scan_with_cancel(&config.screener.symbols, &cancel)
        .await?;

    let report = ScanReport::new(&run);
    println!("{}", report.to_markdown());

    if let Some(dir) = config.screener.report_dir() {
        let stem = dir.join(format!("scan_{}", run.completed_at.format("%Y%m%d_%H%M%S")));
        for format in [ReportFormat::Markdown, ReportFormat::Json] {
            let path = report.save_to_file(&stem, format)?;
            tracing::info!(path = %path.display(), %format, "Report written");
        }
    }

    if let Some(latest) = store.latest() {
        tracing::info!(scan_id = %latest.id, "{}", latest.summary());
    }

    Ok(())
}
