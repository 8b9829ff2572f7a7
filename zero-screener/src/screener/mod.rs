//! Screener orchestration.
//!
//! # Usage
//!
//! ```ignore
//! use zero_screener::screener::{ScreenerDocument, ScreenerEngine, ScanSettings};
//!
//! let document = Arc::new(ScreenerDocument::load(&path)?);
//! let engine = ScreenerEngine::new(provider, document, ScanSettings::default())
//!     .with_progress(Arc::new(LoggingProgress))
//!     .with_store(store.clone());
//!
//! let run = engine.run_scan(&symbols).await?;
//! println!("{}", ScanReport::new(&run).to_markdown());
//! ```

pub mod config;
pub mod engine;
pub mod report;
pub mod store;

pub use config::ScreenerDocument;
pub use engine::{
    LoggingProgress, ProgressSink, ScanResult, ScanRun, ScanSettings, ScreenerEngine,
    SymbolReport, SymbolStatus,
};
pub use report::{ReportFormat, ScanReport};
pub use store::ScanStore;
