//! Stop-loss and take-profit levels for a buy signal.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Timeframe;
use crate::indicators::AnalyzedBar;
use crate::screener::config::{RiskManagement, StrategyDefinition};

const DEFAULT_STOP_LOSS_MULTIPLE: f64 = 1.5;
const DEFAULT_TAKE_PROFIT_MULTIPLE: f64 = 3.0;
const DEFAULT_TIMEFRAME_MULTIPLE: f64 = 2.0;

/// Risk levels for the latest bar. Both are `None` when no ATR is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskLevels {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// Derives [`RiskLevels`] from ATR and the strategy's shape.
pub struct RiskCalculator<'a> {
    config: &'a RiskManagement,
}

impl<'a> RiskCalculator<'a> {
    pub fn new(config: &'a RiskManagement) -> Self {
        Self { config }
    }

    /// Strategies declaring a stop multiple get `close ∓ atr * multiple`.
    /// Others use the per-timeframe stop multiple and the middle band as target.
    pub fn compute(
        &self,
        bar: &AnalyzedBar,
        strategy: &StrategyDefinition,
        timeframe: Timeframe,
    ) -> RiskLevels {
        let close = bar.bar.close;
        let Some(atr) = bar.indicators.atr.filter(|a| a.is_finite() && *a != 0.0) else {
            debug!(%timeframe, "ATR undefined or zero, no risk levels");
            return RiskLevels::default();
        };

        if strategy.has_explicit_atr_multiples() {
            let sl = strategy
                .stop_loss_atr_multiple
                .unwrap_or(DEFAULT_STOP_LOSS_MULTIPLE);
            let tp = strategy
                .take_profit_atr_multiple
                .unwrap_or(DEFAULT_TAKE_PROFIT_MULTIPLE);
            return RiskLevels {
                stop_loss: Some(close - atr * sl),
                take_profit: Some(close + atr * tp),
            };
        }

        let multiple = self
            .config
            .stop_loss
            .atr_multiple_by_tf
            .get(timeframe.as_token())
            .copied()
            .unwrap_or(DEFAULT_TIMEFRAME_MULTIPLE);

        RiskLevels {
            stop_loss: Some(close - atr * multiple),
            take_profit: bar.indicators.bollinger.middle,
        }
    }
}
