//! Configuration management for the Zero screener service.
//!
//! The service reads one JSON file at `~/.zero/config.json`. The strategy
//! document (indicator periods, strategies, asset profiles) lives in its own
//! file referenced by `screener.document_path`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `ZERO_LOG_LEVEL` → observability.log_level
//! - `ZERO_LOG_FORMAT` → observability.log_format
//! - `ZERO_SCREENER_DOCUMENT` → screener.document_path
//! - `ZERO_SCREENER_REPORT_DIR` → screener.report_dir
//! - `APCA_DATA_URL` → screener.data_base_url
//! - `APCA_API_KEY_ID` → secrets.alpaca.api_key_id
//! - `APCA_API_SECRET_KEY` → secrets.alpaca.api_secret_key

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new()
        .map_or_else(
            || PathBuf::from(".zero"),
            |dirs| dirs.home_dir().join(".zero"),
        )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Credentials for external data providers
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Screener run configuration
    #[serde(default)]
    pub screener: ScreenerServiceConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable fallbacks.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("ZERO_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("ZERO_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Ok(path) = std::env::var("ZERO_SCREENER_DOCUMENT") {
            self.screener.document_path = path;
        }
        if let Ok(dir) = std::env::var("ZERO_SCREENER_REPORT_DIR") {
            self.screener.report_dir = Some(dir);
        }
        if let Ok(url) = std::env::var("APCA_DATA_URL") {
            self.screener.data_base_url = url;
        }

        if let Ok(key) = std::env::var("APCA_API_KEY_ID") {
            self.secrets.alpaca.api_key_id = Some(key);
        }
        if let Ok(secret) = std::env::var("APCA_API_SECRET_KEY") {
            self.secrets.alpaca.api_secret_key = Some(secret);
        }
    }

    /// Alpaca credentials as `(key_id, secret_key)`, if both are present.
    pub fn alpaca_credentials(&self) -> Option<(String, String)> {
        let alpaca = &self.secrets.alpaca;
        match (&alpaca.api_key_id, &alpaca.api_secret_key) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some((key.clone(), secret.clone()))
            }
            _ => None,
        }
    }

    /// Require Alpaca credentials, failing with a configuration error.
    pub fn require_alpaca_credentials(&self) -> Result<(String, String)> {
        self.alpaca_credentials().ok_or_else(|| {
            Error::Config(
                "Alpaca credentials missing: set secrets.alpaca or APCA_API_KEY_ID/APCA_API_SECRET_KEY"
                    .into(),
            )
        })
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to reduce to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Secrets
// ============================================================================

/// External provider credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default)]
    pub alpaca: AlpacaSecrets,
}

/// Alpaca market data credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlpacaSecrets {
    #[serde(default)]
    pub api_key_id: Option<String>,
    #[serde(default)]
    pub api_secret_key: Option<String>,
}

// ============================================================================
// Screener
// ============================================================================

/// Configuration for one screener process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerServiceConfig {
    /// Path to the strategy document (YAML or JSON). `~` is expanded.
    #[serde(default = "default_document_path")]
    pub document_path: String,

    /// Market data API base URL
    #[serde(default = "default_data_base_url")]
    pub data_base_url: String,

    /// Market data feed (iex, sip)
    #[serde(default = "default_feed")]
    pub feed: String,

    /// Calendar days of history requested per fetch
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Symbols processed at once. 1 keeps the scan strictly sequential.
    #[serde(default = "default_max_concurrent_symbols")]
    pub max_concurrent_symbols: usize,

    /// Retry policy for market data requests
    #[serde(default)]
    pub retry: RetryConfig,

    /// Symbol universe, in scan order, mapped to its asset profile
    #[serde(default = "default_symbols")]
    pub symbols: IndexMap<String, String>,

    /// Directory where reports are written after each run
    #[serde(default)]
    pub report_dir: Option<String>,
}

impl Default for ScreenerServiceConfig {
    fn default() -> Self {
        Self {
            document_path: default_document_path(),
            data_base_url: default_data_base_url(),
            feed: default_feed(),
            lookback_days: default_lookback_days(),
            max_concurrent_symbols: default_max_concurrent_symbols(),
            retry: RetryConfig::default(),
            symbols: default_symbols(),
            report_dir: None,
        }
    }
}

impl ScreenerServiceConfig {
    /// Strategy document path with `~` expanded.
    pub fn document_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.document_path).into_owned())
    }

    /// Report directory with `~` expanded.
    pub fn report_dir(&self) -> Option<PathBuf> {
        self.report_dir
            .as_ref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()))
    }
}

fn default_document_path() -> String {
    "~/.zero/stock_signals_v1.yml".to_string()
}

fn default_data_base_url() -> String {
    "https://data.alpaca.markets".to_string()
}

fn default_feed() -> String {
    "iex".to_string()
}

fn default_lookback_days() -> u32 {
    90
}

fn default_max_concurrent_symbols() -> usize {
    1
}

/// Default scan universe grouped by volatility profile.
pub fn default_symbols() -> IndexMap<String, String> {
    [
        ("AAPL", "low_vol_profile"),
        ("MSFT", "low_vol_profile"),
        ("GOOGL", "low_vol_profile"),
        ("NVDA", "mid_vol_profile"),
        ("AMD", "mid_vol_profile"),
        ("TSLA", "high_vol_profile"),
        ("MSTR", "high_vol_profile"),
        ("RIOT", "high_vol_profile"),
        ("MARA", "high_vol_profile"),
        ("SOFI", "micro_cap_profile"),
        ("PLTR", "micro_cap_profile"),
        ("RIVN", "micro_cap_profile"),
    ]
    .into_iter()
    .map(|(symbol, profile)| (symbol.to_string(), profile.to_string()))
    .collect()
}

/// Retry policy for market data requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles after each failure
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_secs() -> u64 {
    2
}

// ============================================================================
// Tests
// ============================================================================
