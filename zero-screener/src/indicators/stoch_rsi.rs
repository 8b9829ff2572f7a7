//! Stochastic RSI.
//!
//! RSI with Wilder smoothing, stochastic of the RSI over `stoch` bars, then
//! `%K = SMA(k)` and `%D = SMA(d)` of `%K`.

use serde::{Deserialize, Serialize};

use super::vwma::finite;

/// StochRSI lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StochRsiLengths {
    pub rsi: usize,
    pub stoch: usize,
    pub k: usize,
    pub d: usize,
}

impl Default for StochRsiLengths {
    fn default() -> Self {
        Self {
            rsi: 14,
            stoch: 14,
            k: 3,
            d: 3,
        }
    }
}

impl StochRsiLengths {
    /// Bars required before the oscillator is computed at all.
    pub fn required_bars(&self) -> usize {
        self.rsi + self.stoch
    }
}

/// `(stoch_k, stoch_d)` for `close`. Both are all-undefined when the series
/// is not longer than `rsi + stoch`.
pub fn stoch_rsi(close: &[f64], lengths: StochRsiLengths) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = close.len();
    if n <= lengths.required_bars() {
        return (vec![None; n], vec![None; n]);
    }

    let rsi_values = rsi(close, lengths.rsi.max(1));
    let stoch = stochastic(&rsi_values, lengths.stoch.max(1));
    let k = sma_defined(&stoch, lengths.k.max(1));
    let d = sma_defined(&k, lengths.d.max(1));
    (k, d)
}

/// Wilder RSI. The first value sits at index `period`.
///
/// Flat stretches (no gains and no losses) are undefined.
pub fn rsi(close: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; close.len()];
    if close.len() <= period {
        return out;
    }

    let changes: Vec<f64> = close.windows(2).map(|w| w[1] - w[0]).collect();
    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;
    out[period] = rsi_from(avg_gain, avg_loss);

    for (offset, change) in changes[period..].iter().enumerate() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + change.max(0.0)) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + (-change).max(0.0)) / period as f64;
        out[period + 1 + offset] = rsi_from(avg_gain, avg_loss);
    }
    out
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    finite(100.0 * avg_gain / (avg_gain + avg_loss))
}

/// `100 * (x - min) / (max - min)` over a window of fully defined values.
fn stochastic(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    for end in window.saturating_sub(1)..values.len() {
        let Some(current) = values[end] else { continue };
        let Some(chunk) = defined_window(values, end, window) else { continue };

        let lo = chunk.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = chunk.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        out[end] = finite(100.0 * (current - lo) / (hi - lo));
    }
    out
}

/// Simple moving average over windows where every value is defined.
fn sma_defined(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    for end in window.saturating_sub(1)..values.len() {
        if let Some(chunk) = defined_window(values, end, window) {
            out[end] = finite(chunk.iter().sum::<f64>() / window as f64);
        }
    }
    out
}

fn defined_window(values: &[Option<f64>], end: usize, window: usize) -> Option<Vec<f64>> {
    let start = (end + 1).checked_sub(window)?;
    values[start..=end].iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let close: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let out = rsi(&close, 3);
        assert_eq!(out[2], None);
        assert!((out[3].unwrap() - 100.0).abs() < 1e-9);
        assert!((out[9].unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_flat_is_undefined() {
        let close = vec![5.0; 8];
        assert!(rsi(&close, 3).iter().all(Option::is_none));
    }

    #[test]
    fn test_rsi_wilder_seed() {
        // changes: +2, -1, +1 -> avg gain 1, avg loss 1/3
        let close = vec![10.0, 12.0, 11.0, 12.0];
        let out = rsi(&close, 3);
        assert!((out[3].unwrap() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_stoch_rsi_requires_enough_bars() {
        let lengths = StochRsiLengths::default();
        let (k, d) = stoch_rsi(&zigzag(28), lengths);
        assert!(k.iter().all(Option::is_none));
        assert!(d.iter().all(Option::is_none));
    }

    #[test]
    fn test_stoch_rsi_bounds_and_warmup() {
        let lengths = StochRsiLengths::default();
        let close = zigzag(80);
        let (k, d) = stoch_rsi(&close, lengths);

        // RSI at 14, stochastic at 27, %K at 29, %D at 31
        assert!(k[28].is_none());
        assert!(k[29].is_some());
        assert!(d[30].is_none());
        assert!(d[31].is_some());

        for value in k.iter().chain(d.iter()).flatten() {
            assert!((0.0..=100.0).contains(value), "out of range: {}", value);
        }
    }

    #[test]
    fn test_sma_defined_skips_gaps() {
        let values = vec![None, Some(1.0), Some(3.0), None, Some(5.0)];
        let out = sma_defined(&values, 2);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(2.0));
        assert_eq!(out[3], None);
        assert_eq!(out[4], None);
    }
}
