//! Volume-weighted moving average and rolling volume mean.

use statrs::statistics::Statistics;

use crate::data::Bar;

/// Rolling `sum(typical_price * volume) / sum(volume)` over `window` bars.
///
/// The first `window - 1` entries are undefined, as is any window whose
/// volume sums to zero.
pub fn vwma(bars: &[Bar], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    let mut out = vec![None; bars.len()];
    if bars.len() < window {
        return out;
    }

    for (end, chunk) in bars.windows(window).enumerate() {
        let pv: f64 = chunk.iter().map(|b| b.typical_price() * b.volume).sum();
        let volume: f64 = chunk.iter().map(|b| b.volume).sum();
        out[end + window - 1] = finite(pv / volume);
    }
    out
}

/// Rolling arithmetic mean over `window` values.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    let mut out = vec![None; values.len()];
    if values.len() < window {
        return out;
    }

    for (end, chunk) in values.windows(window).enumerate() {
        out[end + window - 1] = finite(Statistics::mean(chunk.iter()));
    }
    out
}

/// `Some(x)` for finite `x`, otherwise undefined.
pub(crate) fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars(points: &[(f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        points
            .iter()
            .enumerate()
            .map(|(i, &(price, volume))| Bar {
                timestamp: start + Duration::days(i as i64),
                open: price,
                high: price,
                low: price,
                close: price,
                volume,
            })
            .collect()
    }

    #[test]
    fn test_vwma_weights_by_volume() {
        let data = bars(&[(10.0, 1.0), (20.0, 3.0), (30.0, 1.0)]);
        let out = vwma(&data, 2);
        assert_eq!(out[0], None);
        // (10*1 + 20*3) / 4
        assert!((out[1].unwrap() - 17.5).abs() < 1e-9);
        // (20*3 + 30*1) / 4
        assert!((out[2].unwrap() - 22.5).abs() < 1e-9);
    }

    #[test]
    fn test_vwma_zero_volume_is_undefined() {
        let data = bars(&[(10.0, 0.0), (20.0, 0.0)]);
        assert_eq!(vwma(&data, 2), vec![None, None]);
    }

    #[test]
    fn test_vwma_window_longer_than_series() {
        let data = bars(&[(10.0, 1.0)]);
        assert_eq!(vwma(&data, 5), vec![None]);
    }

    #[test]
    fn test_rolling_mean() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[1], None);
        assert!((out[2].unwrap() - 2.0).abs() < 1e-9);
        assert!((out[3].unwrap() - 3.0).abs() < 1e-9);
    }
}
