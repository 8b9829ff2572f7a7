//! Signal engine.
//!
//! A strategy definition becomes a list of typed [`Predicate`]s, one per
//! enabled check. A bar is labeled `Buy (<strategy>)` when every predicate
//! and every [`GatingFilter`] passes; otherwise it is `Empty`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info};

use crate::data::Timeframe;
use crate::error::ScreenerError;
use crate::indicators::{AnalyzedBar, AnalyzedSeries, IndicatorColumn};
use crate::screener::config::{ScreenerDocument, StrategyDefinition};

// ============================================================================
// Signal Label
// ============================================================================

/// Label assigned to a bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalLabel {
    /// Buy condition met for the named strategy
    Buy(String),
    Empty,
}

impl SignalLabel {
    pub fn is_buy(&self) -> bool {
        matches!(self, Self::Buy(_))
    }
}

impl fmt::Display for SignalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy(strategy) => write!(f, "Buy ({})", strategy),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

// ============================================================================
// Predicates
// ============================================================================

/// One check of a strategy. Any comparison against an undefined value fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// close > vwma_slow
    Uptrend,
    /// vwma_fast > vwma_slow
    FastAboveSlow,
    /// |close - column| / column * 100 <= pct
    Proximity { column: IndicatorColumn, pct: f64 },
    /// k_min <= stoch_k <= k_max
    StochRange { k_min: f64, k_max: f64 },
}

impl Predicate {
    pub fn evaluate(&self, bar: &AnalyzedBar) -> bool {
        let ind = &bar.indicators;
        let close = bar.bar.close;
        match self {
            Self::Uptrend => ind.vwma_slow.is_some_and(|slow| close > slow),
            Self::FastAboveSlow => match (ind.vwma_fast, ind.vwma_slow) {
                (Some(fast), Some(slow)) => fast > slow,
                _ => false,
            },
            Self::Proximity { column, pct } => bar.value(*column).is_some_and(|reference| {
                let distance = (close - reference).abs() / reference * 100.0;
                distance.is_finite() && distance <= *pct
            }),
            Self::StochRange { k_min, k_max } => ind
                .stoch_k
                .is_some_and(|k| *k_min <= k && k <= *k_max),
        }
    }
}

/// Gating filters applied on top of every strategy.
///
/// Each one passes unconditionally today; they are where market-regime,
/// higher-timeframe and volume confirmation plug in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatingFilter {
    MarketRegime,
    HigherTimeframeTrend,
    VolumeConfirmation,
}

impl GatingFilter {
    pub const ALL: [GatingFilter; 3] = [
        Self::MarketRegime,
        Self::HigherTimeframeTrend,
        Self::VolumeConfirmation,
    ];

    pub fn allows(&self, _bar: &AnalyzedBar) -> bool {
        match self {
            Self::MarketRegime => true,
            Self::HigherTimeframeTrend => true,
            Self::VolumeConfirmation => true,
        }
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// A resolved strategy ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub predicates: Vec<Predicate>,
}

impl Strategy {
    /// Build predicates for the enabled checks, in a fixed order.
    ///
    /// An unknown proximity column is a configuration error.
    pub fn from_definition(name: &str, def: &StrategyDefinition) -> Result<Self, ScreenerError> {
        let mut predicates = Vec::new();

        if def.is_uptrend {
            predicates.push(Predicate::Uptrend);
        }
        if def.fast_vwma_above_slow {
            predicates.push(Predicate::FastAboveSlow);
        }
        if def.proximity_check.enabled {
            let column = def.proximity_check.ma_column.parse::<IndicatorColumn>().map_err(|_| {
                ScreenerError::Configuration(format!(
                    "Strategy '{}' references unknown proximity column '{}'",
                    name, def.proximity_check.ma_column
                ))
            })?;
            predicates.push(Predicate::Proximity {
                column,
                pct: def.proximity_check.proximity_pct,
            });
        }
        if def.stoch_check.enabled {
            predicates.push(Predicate::StochRange {
                k_min: def.stoch_check.k_min,
                k_max: def.stoch_check.k_max,
            });
        }

        Ok(Self {
            name: name.to_string(),
            predicates,
        })
    }

    /// Whether every predicate and gating filter passes at this bar.
    ///
    /// A strategy with no enabled checks never fires.
    pub fn is_satisfied(&self, bar: &AnalyzedBar) -> bool {
        !self.predicates.is_empty()
            && self.predicates.iter().all(|p| p.evaluate(bar))
            && GatingFilter::ALL.iter().all(|g| g.allows(bar))
    }

    /// Label every bar of the series.
    pub fn evaluate(&self, series: &AnalyzedSeries) -> Vec<SignalLabel> {
        series
            .bars
            .iter()
            .map(|bar| {
                if self.is_satisfied(bar) {
                    SignalLabel::Buy(self.name.clone())
                } else {
                    SignalLabel::Empty
                }
            })
            .collect()
    }
}

// ============================================================================
// Signal Engine
// ============================================================================

/// Resolves (profile, timeframe) to a strategy and labels a series.
pub struct SignalEngine<'a> {
    document: &'a ScreenerDocument,
}

impl<'a> SignalEngine<'a> {
    pub fn new(document: &'a ScreenerDocument) -> Self {
        Self { document }
    }

    /// Strategy bound to (profile, timeframe). `Ok(None)` when unbound.
    pub fn resolve(
        &self,
        profile: &str,
        timeframe: Timeframe,
    ) -> Result<Option<Strategy>, ScreenerError> {
        match self.document.strategy_for(profile, timeframe) {
            Some((name, def)) => Strategy::from_definition(name, def).map(Some),
            None => Ok(None),
        }
    }

    /// Label every bar. A missing binding labels everything `Empty`.
    pub fn evaluate(
        &self,
        series: &AnalyzedSeries,
        profile: &str,
    ) -> Result<Vec<SignalLabel>, ScreenerError> {
        let Some(strategy) = self.resolve(profile, series.timeframe)? else {
            error!(
                profile,
                timeframe = %series.timeframe,
                "Strategy not defined for profile and timeframe, skipping"
            );
            return Ok(vec![SignalLabel::Empty; series.len()]);
        };

        info!(
            symbol = %series.symbol,
            profile,
            timeframe = %series.timeframe,
            strategy = %strategy.name,
            checks = strategy.predicates.len(),
            "Generating signals"
        );
        if strategy.predicates.is_empty() {
            debug!(strategy = %strategy.name, "Strategy has no enabled checks");
        }

        let labels = strategy.evaluate(series);
        let buys = labels.iter().filter(|l| l.is_buy()).count();
        info!(
            symbol = %series.symbol,
            timeframe = %series.timeframe,
            buy = buys,
            empty = labels.len() - buys,
            "Signal generation complete"
        );
        Ok(labels)
    }
}

// ============================================================================
// Tests
// ============================================================================
