//! Report generation for scan runs.
//!
//! - Markdown (human-readable table of buy signals)
//! - JSON (the full run, for programmatic use)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::engine::{ScanResult, ScanRun, SymbolStatus};

// ============================================================================
// Report Format
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

// ============================================================================
// Scan Report
// ============================================================================

/// Renders a [`ScanRun`].
pub struct ScanReport<'a> {
    run: &'a ScanRun,
}

impl<'a> ScanReport<'a> {
    pub fn new(run: &'a ScanRun) -> Self {
        Self { run }
    }

    pub fn generate(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Markdown => self.to_markdown(),
            ReportFormat::Json => self.to_json(),
        }
    }

    /// Write the report. A path without extension gets the format's one.
    pub fn save_to_file(&self, path: &Path, format: ReportFormat) -> Result<PathBuf> {
        let content = self.generate(format);
        let file_path = if path.extension().is_none() {
            path.with_extension(format.extension())
        } else {
            path.to_path_buf()
        };

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create report directory")?;
        }
        std::fs::write(&file_path, content).context("Failed to write report file")?;

        Ok(file_path)
    }

    pub fn to_markdown(&self) -> String {
        let run = self.run;
        let mut md = String::new();

        md.push_str(&format!(
            "# Screener Report\n\n**Scan ID**: {}\n**Completed**: {}\n**Duration**: {:.1}s\n\n",
            run.id,
            run.completed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            run.duration_secs
        ));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Symbols scanned**: {}\n", run.total_symbols));
        md.push_str(&format!("- **Buy signals**: {}\n", run.results.len()));
        let no_data = run
            .symbols
            .iter()
            .filter(|s| s.status == SymbolStatus::NoData)
            .count();
        md.push_str(&format!("- **No data**: {}\n", no_data));
        md.push_str(&format!("- **Failed**: {}\n\n", run.failed_symbols().count()));

        md.push_str("## Signals\n\n");
        if run.results.is_empty() {
            md.push_str("No buy signals in this run.\n");
        } else {
            md.push_str("| Symbol | TF | Price | Volume | VWMA | Stoch K | Stoch D | Signal | SL | TP | Profile |\n");
            md.push_str("|--------|----|-------|--------|------|---------|---------|--------|----|----|---------|\n");
            for result in &run.results {
                md.push_str(&markdown_row(result));
            }
        }

        let failed: Vec<_> = run.failed_symbols().collect();
        if !failed.is_empty() {
            md.push_str("\n## Failures\n\n");
            for report in failed {
                if let SymbolStatus::Failed(reason) = &report.status {
                    md.push_str(&format!("- **{}**: {}\n", report.symbol, reason));
                }
            }
        }

        md
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self.run).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

fn markdown_row(r: &ScanResult) -> String {
    format!(
        "| {} | {} | {:.2} | {:.0} | {} | {} | {} | {} | {} | {} | {} |\n",
        r.symbol,
        r.timeframe,
        r.price,
        r.volume,
        fmt_level(r.indicators.vwma_slow),
        fmt_level(r.indicators.stoch_k),
        fmt_level(r.indicators.stoch_d),
        r.signal,
        fmt_level(r.stop_loss),
        fmt_level(r.take_profit),
        r.profile
    )
}

fn fmt_level(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => "N/A".to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
