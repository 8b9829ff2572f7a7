//! Error taxonomy for the screening pipeline.
//!
//! Only [`ScreenerError::InvalidDocument`] is fatal to a run. Everything else
//! degrades a single (symbol, timeframe) cell or a single symbol.

use thiserror::Error;

use crate::data::ProviderError;

/// Result type alias for screener operations.
pub type Result<T> = std::result::Result<T, ScreenerError>;

/// Screener error type.
#[derive(Debug, Error)]
pub enum ScreenerError {
    /// Bad configuration for one cell: unsupported timeframe token, unknown
    /// indicator column. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider or network failure. Retried, then downgraded to no data.
    #[error("Transient fetch error: {0}")]
    TransientFetch(#[from] ProviderError),

    /// Catch-all boundary around one symbol's pipeline.
    #[error("Failed to process {symbol}: {reason}")]
    SymbolProcessing { symbol: String, reason: String },

    /// The run was abandoned between symbols.
    #[error("Scan cancelled")]
    Cancelled,

    /// The strategy document could not be read, parsed or validated.
    #[error("Invalid screener document: {0}")]
    InvalidDocument(String),
}

impl From<zero_common::Error> for ScreenerError {
    fn from(err: zero_common::Error) -> Self {
        Self::InvalidDocument(err.to_string())
    }
}
