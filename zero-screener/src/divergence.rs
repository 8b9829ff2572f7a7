//! Divergence detection between price lows and an oscillator.
//!
//! # Pivots
//!
//! Pivot lows are peaks of the negated series, selected the same way as
//! `scipy.signal.find_peaks`: local maxima (plateaus resolve to their
//! midpoint), then a minimum distance filter that keeps the highest peaks
//! first, then a minimum prominence filter.
//!
//! # Regular bullish divergence
//!
//! For each consecutive pair of price pivots where price makes a lower low,
//! the oscillator pivots inside `[previous, current]` are collected. With at
//! least two of them and the last above the first (a higher low), the
//! current price pivot is flagged.
//!
//! Bearish divergence is not detected yet; its flag stays false.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::indicators::{AnalyzedSeries, IndicatorColumn};
use crate::screener::config::{DivergenceConfig, REGULAR_BULLISH};

/// Flags divergences on an analyzed series.
#[derive(Debug, Clone)]
pub struct DivergenceDetector<'a> {
    config: &'a DivergenceConfig,
}

impl<'a> DivergenceDetector<'a> {
    pub fn new(config: &'a DivergenceConfig) -> Self {
        Self { config }
    }

    /// Set `bullish_divergence` / `bearish_divergence` on every bar.
    ///
    /// Disabled detection or an unusable oscillator leaves every flag false.
    pub fn detect(&self, series: &mut AnalyzedSeries) {
        for bar in &mut series.bars {
            bar.indicators.bullish_divergence = false;
            bar.indicators.bearish_divergence = false;
        }

        if !self.config.enabled || series.is_empty() {
            return;
        }

        let column = match self.config.oscillator.parse::<IndicatorColumn>() {
            Ok(column) => column,
            Err(_) => {
                warn!(
                    symbol = %series.symbol,
                    oscillator = %self.config.oscillator,
                    "Oscillator not found, skipping divergence detection"
                );
                return;
            }
        };

        // Oscillator with undefined values dropped, keeping bar positions
        let (osc_positions, osc_values): (Vec<usize>, Vec<f64>) = series
            .bars
            .iter()
            .enumerate()
            .filter_map(|(i, bar)| bar.value(column).map(|v| (i, v)))
            .unzip();
        if osc_values.is_empty() {
            return;
        }

        let distance = self.config.pivot_distance();
        let prominence = self.config.prominence;

        let negated_lows: Vec<f64> = series.bars.iter().map(|b| -b.bar.low).collect();
        let price_pivots: Vec<(DateTime<Utc>, f64, usize)> =
            find_peaks(&negated_lows, prominence, distance)
                .into_iter()
                .map(|i| (series.bars[i].timestamp(), series.bars[i].bar.low, i))
                .collect();

        let negated_osc: Vec<f64> = osc_values.iter().map(|v| -v).collect();
        let osc_pivots: Vec<(DateTime<Utc>, f64)> = find_peaks(&negated_osc, prominence, distance)
            .into_iter()
            .map(|i| (series.bars[osc_positions[i]].timestamp(), osc_values[i]))
            .collect();

        if self.config.types.buy.iter().any(|t| t == REGULAR_BULLISH) {
            let flagged = regular_bullish(&price_pivots, &osc_pivots);
            for &index in &flagged {
                series.bars[index].indicators.bullish_divergence = true;
            }
            debug!(
                symbol = %series.symbol,
                timeframe = %series.timeframe,
                price_pivots = price_pivots.len(),
                oscillator_pivots = osc_pivots.len(),
                bullish = flagged.len(),
                "Divergence scan complete"
            );
        }
    }
}

/// Bar indices of price pivots that complete a regular bullish divergence.
fn regular_bullish(
    price_pivots: &[(DateTime<Utc>, f64, usize)],
    osc_pivots: &[(DateTime<Utc>, f64)],
) -> Vec<usize> {
    price_pivots
        .windows(2)
        .filter_map(|pair| {
            let (prev_ts, prev_low, _) = pair[0];
            let (cur_ts, cur_low, cur_index) = pair[1];
            if cur_low >= prev_low {
                return None;
            }

            let window: Vec<f64> = osc_pivots
                .iter()
                .filter(|(ts, _)| *ts >= prev_ts && *ts <= cur_ts)
                .map(|&(_, v)| v)
                .collect();

            match (window.first(), window.last()) {
                (Some(first), Some(last)) if window.len() >= 2 && last > first => Some(cur_index),
                _ => None,
            }
        })
        .collect()
}

// ============================================================================
// Peak Finding
// ============================================================================

/// Indices of peaks in `x` with at least `min_prominence` prominence and at
/// least `distance` samples between any two kept peaks.
pub fn find_peaks(x: &[f64], min_prominence: f64, distance: usize) -> Vec<usize> {
    let mut peaks = local_maxima(x);
    if distance >= 1 {
        peaks = select_by_distance(x, &peaks, distance);
    }
    peaks
        .into_iter()
        .filter(|&peak| prominence(x, peak) >= min_prominence)
        .collect()
}

/// Strict local maxima. Flat tops count once, at their (rounded-down)
/// midpoint. The first and last samples are never peaks.
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }

    let i_max = x.len() - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let left_edge = i;
                let right_edge = ahead - 1;
                peaks.push((left_edge + right_edge) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Drop peaks closer than `distance` to a higher peak, highest first.
fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];

    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }

        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }

        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&peak, kept)| kept.then_some(peak))
        .collect()
}

/// Height of a peak above the higher of its two surrounding bases.
fn prominence(x: &[f64], peak: usize) -> f64 {
    let height = x[peak];

    let mut left_min = height;
    for &v in x[..=peak].iter().rev() {
        if v > height {
            break;
        }
        left_min = left_min.min(v);
    }

    let mut right_min = height;
    for &v in &x[peak..] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    height - left_min.max(right_min)
}

// ============================================================================
// Tests
// ============================================================================
