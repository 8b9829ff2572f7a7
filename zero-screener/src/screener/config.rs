//! Strategy document.
//!
//! The YAML (or JSON) document that drives a scan: indicator periods per
//! timeframe, StochRSI parameter sets, risk defaults, named strategies, and
//! asset-profile bindings. It is resolved once per scan and shared
//! read-only by every symbol.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;
use zero_common::error::ResultExt;
use zero_common::validation::{Validate, ValidationError, ValidationResult};

use crate::data::Timeframe;
use crate::error::ScreenerError;
use crate::indicators::{IndicatorParams, StochRsiLengths};

// ============================================================================
// Document
// ============================================================================

/// Root of the strategy document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenerDocument {
    #[serde(default)]
    pub defaults: Defaults,

    /// profile → timeframe token → binding
    #[serde(default)]
    pub asset_profiles: IndexMap<String, IndexMap<String, ProfileBinding>>,
}

/// Shared defaults section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Timeframe tokens scanned for every symbol, in order
    #[serde(default = "default_timeframes")]
    pub timeframes_to_test: Vec<String>,

    #[serde(default)]
    pub indicators: IndicatorDefaults,

    /// timeframe token → StochRSI parameter set
    #[serde(default)]
    pub stoch_rsi_params: IndexMap<String, StochRsiParams>,

    #[serde(default)]
    pub risk_management: RiskManagement,

    /// strategy name → definition
    #[serde(default)]
    pub strategies: IndexMap<String, StrategyDefinition>,

    #[serde(default)]
    pub divergence: DivergenceConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeframes_to_test: default_timeframes(),
            indicators: IndicatorDefaults::default(),
            stoch_rsi_params: IndexMap::new(),
            risk_management: RiskManagement::default(),
            strategies: IndexMap::new(),
            divergence: DivergenceConfig::default(),
        }
    }
}

fn default_timeframes() -> Vec<String> {
    vec!["1d".to_string()]
}

// ============================================================================
// Indicators
// ============================================================================

/// Indicator periods and band widths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorDefaults {
    /// timeframe token → VWMA periods
    #[serde(default)]
    pub vwma_period_by_tf: IndexMap<String, VwmaPeriods>,

    #[serde(default = "default_vwma_fast")]
    pub vwma_fast_period_default: usize,

    #[serde(default = "default_vwma_slow")]
    pub vwma_slow_period_default: usize,

    #[serde(default = "default_volume_lookback")]
    pub volume_lookback_period: usize,

    /// Deviations for the lower band
    #[serde(default = "default_bb_stddev")]
    pub buy_bb_stddev: f64,

    /// Deviations for the upper band
    #[serde(default = "default_bb_stddev")]
    pub sell_bb_stddev: f64,
}

impl Default for IndicatorDefaults {
    fn default() -> Self {
        Self {
            vwma_period_by_tf: IndexMap::new(),
            vwma_fast_period_default: default_vwma_fast(),
            vwma_slow_period_default: default_vwma_slow(),
            volume_lookback_period: default_volume_lookback(),
            buy_bb_stddev: default_bb_stddev(),
            sell_bb_stddev: default_bb_stddev(),
        }
    }
}

fn default_vwma_fast() -> usize {
    10
}

fn default_vwma_slow() -> usize {
    20
}

fn default_volume_lookback() -> usize {
    20
}

fn default_bb_stddev() -> f64 {
    2.0
}

/// Per-timeframe VWMA overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VwmaPeriods {
    #[serde(default)]
    pub fast: Option<usize>,
    #[serde(default)]
    pub slow: Option<usize>,
}

/// One StochRSI parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StochRsiParams {
    #[serde(default = "default_rsi")]
    pub rsi: usize,
    #[serde(default = "default_rsi")]
    pub stoch: usize,
    #[serde(default = "default_smoothing")]
    pub k: usize,
    #[serde(default = "default_smoothing")]
    pub d: usize,
    /// Use another timeframe's parameter set instead
    #[serde(default)]
    pub inherit: Option<String>,
}

impl Default for StochRsiParams {
    fn default() -> Self {
        Self {
            rsi: default_rsi(),
            stoch: default_rsi(),
            k: default_smoothing(),
            d: default_smoothing(),
            inherit: None,
        }
    }
}

impl From<&StochRsiParams> for StochRsiLengths {
    fn from(params: &StochRsiParams) -> Self {
        Self {
            rsi: params.rsi,
            stoch: params.stoch,
            k: params.k,
            d: params.d,
        }
    }
}

fn default_rsi() -> usize {
    14
}

fn default_smoothing() -> usize {
    3
}

// ============================================================================
// Risk
// ============================================================================

/// Shared risk-management defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskManagement {
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    #[serde(default)]
    pub stop_loss: StopLossConfig,
}

impl Default for RiskManagement {
    fn default() -> Self {
        Self {
            atr_period: default_atr_period(),
            stop_loss: StopLossConfig::default(),
        }
    }
}

fn default_atr_period() -> usize {
    14
}

/// Stop-loss multiples by timeframe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopLossConfig {
    /// timeframe token → ATR multiple
    #[serde(default)]
    pub atr_multiple_by_tf: IndexMap<String, f64>,
}

// ============================================================================
// Strategies
// ============================================================================

/// Declarative strategy: toggles and thresholds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyDefinition {
    /// close > vwma_slow
    #[serde(default)]
    pub is_uptrend: bool,

    /// vwma_fast > vwma_slow
    #[serde(default)]
    pub fast_vwma_above_slow: bool,

    #[serde(default)]
    pub proximity_check: ProximityCheck,

    #[serde(default)]
    pub stoch_check: StochCheck,

    /// Declaring a stop multiple switches risk sizing to `close ± atr * multiple`
    #[serde(default)]
    pub stop_loss_atr_multiple: Option<f64>,

    #[serde(default)]
    pub take_profit_atr_multiple: Option<f64>,
}

impl StrategyDefinition {
    /// Whether the strategy sizes risk from its own ATR multiples.
    ///
    /// Keyed on the stop multiple alone; a lone take-profit multiple is ignored.
    pub fn has_explicit_atr_multiples(&self) -> bool {
        self.stop_loss_atr_multiple.is_some()
    }
}

/// Close-to-moving-average proximity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityCheck {
    #[serde(default)]
    pub enabled: bool,

    /// Indicator column the close is compared with
    #[serde(default = "default_ma_column")]
    pub ma_column: String,

    #[serde(default = "default_proximity_pct")]
    pub proximity_pct: f64,
}

impl Default for ProximityCheck {
    fn default() -> Self {
        Self {
            enabled: false,
            ma_column: default_ma_column(),
            proximity_pct: default_proximity_pct(),
        }
    }
}

fn default_ma_column() -> String {
    "vwma_slow".to_string()
}

fn default_proximity_pct() -> f64 {
    1.0
}

/// StochRSI %K range check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StochCheck {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub k_min: f64,

    #[serde(default = "default_k_max")]
    pub k_max: f64,
}

impl Default for StochCheck {
    fn default() -> Self {
        Self {
            enabled: false,
            k_min: 0.0,
            k_max: default_k_max(),
        }
    }
}

fn default_k_max() -> f64 {
    100.0
}

/// Binding of (profile, timeframe) to a strategy name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileBinding {
    pub strategy: String,
}

// ============================================================================
// Divergence
// ============================================================================

/// Divergence detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergenceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Oscillator column compared with price lows
    #[serde(default = "default_oscillator")]
    pub oscillator: String,

    #[serde(default)]
    pub pivots: PivotSpan,

    /// Minimum pivot prominence
    #[serde(default = "default_prominence")]
    pub prominence: f64,

    #[serde(default)]
    pub types: DivergenceTypes,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            oscillator: default_oscillator(),
            pivots: PivotSpan::default(),
            prominence: default_prominence(),
            types: DivergenceTypes::default(),
        }
    }
}

impl DivergenceConfig {
    /// Minimum separation between two pivots, in bars.
    pub fn pivot_distance(&self) -> usize {
        self.pivots.left + self.pivots.right
    }
}

fn default_oscillator() -> String {
    "stoch_k".to_string()
}

fn default_prominence() -> f64 {
    0.1
}

/// Bars on each side of a pivot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotSpan {
    #[serde(default = "default_pivot_span")]
    pub left: usize,
    #[serde(default = "default_pivot_span")]
    pub right: usize,
}

impl Default for PivotSpan {
    fn default() -> Self {
        Self {
            left: default_pivot_span(),
            right: default_pivot_span(),
        }
    }
}

fn default_pivot_span() -> usize {
    3
}

/// Which divergence patterns are detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergenceTypes {
    #[serde(default = "default_buy_types")]
    pub buy: Vec<String>,
    #[serde(default)]
    pub sell: Vec<String>,
}

impl Default for DivergenceTypes {
    fn default() -> Self {
        Self {
            buy: default_buy_types(),
            sell: Vec::new(),
        }
    }
}

fn default_buy_types() -> Vec<String> {
    vec![REGULAR_BULLISH.to_string()]
}

/// Divergence type name for price lower-low / oscillator higher-low.
pub const REGULAR_BULLISH: &str = "regular_bullish";

// ============================================================================
// Loading and Resolution
// ============================================================================

impl ScreenerDocument {
    /// Load and validate a document. `.json` files are parsed as JSON,
    /// everything else as YAML.
    ///
    /// Any failure here is fatal to the scan.
    pub fn load(path: &Path) -> Result<Self, ScreenerError> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read screener document {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let document = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };

        info!(
            path = %path.display(),
            strategies = document.defaults.strategies.len(),
            profiles = document.asset_profiles.len(),
            timeframes = ?document.defaults.timeframes_to_test,
            "Screener document loaded"
        );
        Ok(document)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ScreenerError> {
        let document: Self = serde_yaml::from_str(content)
            .context("Failed to parse screener document")?;
        document.checked()
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self, ScreenerError> {
        let document: Self = serde_json::from_str(content)
            .context("Failed to parse screener document")?;
        document.checked()
    }

    fn checked(self) -> Result<Self, ScreenerError> {
        self.validate()
            .map_err(|e| ScreenerError::InvalidDocument(e.to_string()))?;
        Ok(self)
    }

    /// Timeframe tokens to scan, unparsed.
    pub fn timeframes(&self) -> &[String] {
        &self.defaults.timeframes_to_test
    }

    /// `(fast, slow)` VWMA periods for a timeframe.
    pub fn vwma_periods(&self, timeframe: Timeframe) -> (usize, usize) {
        let indicators = &self.defaults.indicators;
        let by_tf = indicators.vwma_period_by_tf.get(timeframe.as_token());
        (
            by_tf
                .and_then(|p| p.fast)
                .unwrap_or(indicators.vwma_fast_period_default),
            by_tf
                .and_then(|p| p.slow)
                .unwrap_or(indicators.vwma_slow_period_default),
        )
    }

    /// StochRSI lengths for a timeframe.
    ///
    /// Uses the timeframe's own set, falling back to the `1d` set. If that
    /// set names `inherit`, the referenced set wins when it exists.
    pub fn stoch_rsi_lengths(&self, timeframe: Timeframe) -> StochRsiLengths {
        let sets = &self.defaults.stoch_rsi_params;
        let Some(own) = sets
            .get(timeframe.as_token())
            .or_else(|| sets.get(Timeframe::Daily.as_token()))
        else {
            return StochRsiLengths::default();
        };

        own.inherit
            .as_deref()
            .and_then(|parent| sets.get(parent))
            .unwrap_or(own)
            .into()
    }

    /// Indicator parameters for a timeframe.
    pub fn indicator_params(&self, timeframe: Timeframe) -> IndicatorParams {
        let indicators = &self.defaults.indicators;
        let (vwma_fast, vwma_slow) = self.vwma_periods(timeframe);
        IndicatorParams {
            vwma_fast,
            vwma_slow,
            volume_lookback: indicators.volume_lookback_period,
            stoch_rsi: self.stoch_rsi_lengths(timeframe),
            buy_bb_stddev: indicators.buy_bb_stddev,
            sell_bb_stddev: indicators.sell_bb_stddev,
            atr_period: self.defaults.risk_management.atr_period,
        }
    }

    /// Strategy bound to (profile, timeframe), if the binding and the
    /// strategy both exist.
    pub fn strategy_for(
        &self,
        profile: &str,
        timeframe: Timeframe,
    ) -> Option<(&str, &StrategyDefinition)> {
        let binding = self
            .asset_profiles
            .get(profile)?
            .get(timeframe.as_token())?;
        let (name, definition) = self.defaults.strategies.get_key_value(&binding.strategy)?;
        Some((name.as_str(), definition))
    }
}

impl Validate for ScreenerDocument {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.defaults.timeframes_to_test.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "defaults.timeframes_to_test".into(),
            });
        }

        let indicators = &self.defaults.indicators;
        for (field, value) in [
            ("defaults.indicators.buy_bb_stddev", indicators.buy_bb_stddev),
            ("defaults.indicators.sell_bb_stddev", indicators.sell_bb_stddev),
            ("defaults.divergence.prominence", self.defaults.divergence.prominence),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(ValidationError::InvalidValue {
                    field: field.into(),
                    reason: "must be a non-negative number".into(),
                });
            }
        }

        for (name, strategy) in &self.defaults.strategies {
            let stoch = &strategy.stoch_check;
            if stoch.enabled && stoch.k_min > stoch.k_max {
                errors.push(ValidationError::InvalidValue {
                    field: format!("defaults.strategies.{name}.stoch_check"),
                    reason: format!("k_min {} exceeds k_max {}", stoch.k_min, stoch.k_max),
                });
            }
            let prox = &strategy.proximity_check;
            if prox.enabled && !(prox.proximity_pct.is_finite() && prox.proximity_pct >= 0.0) {
                errors.push(ValidationError::InvalidValue {
                    field: format!("defaults.strategies.{name}.proximity_check.proximity_pct"),
                    reason: "must be a non-negative number".into(),
                });
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
