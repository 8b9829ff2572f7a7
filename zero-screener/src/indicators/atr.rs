//! Average True Range with Wilder smoothing.

use super::vwma::finite;
use crate::data::Bar;

/// ATR over `period` bars.
///
/// The first true range needs a previous close, so the first value lands at
/// index `period`: the mean of `TR[1..=period]`, then
/// `ATR[i] = (ATR[i-1] * (period - 1) + TR[i]) / period`.
pub fn atr(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let period = period.max(1);
    let mut out = vec![None; bars.len()];
    if bars.len() <= period {
        return out;
    }

    let true_range: Vec<f64> = bars
        .windows(2)
        .map(|pair| {
            let (prev, cur) = (&pair[0], &pair[1]);
            (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs())
        })
        .collect();

    // true_range[i] belongs to bar i + 1
    let seed: f64 = true_range[..period].iter().sum::<f64>() / period as f64;
    out[period] = finite(seed);

    let mut value = seed;
    for (offset, tr) in true_range[period..].iter().enumerate() {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
        out[period + 1 + offset] = finite(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: i64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn test_constant_range() {
        let bars: Vec<Bar> = (0..6).map(|i| bar(i, 11.0, 9.0, 10.0)).collect();
        let out = atr(&bars, 3);
        assert_eq!(&out[..3], &[None, None, None]);
        for value in &out[3..] {
            assert!((value.unwrap() - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_gap_uses_previous_close() {
        let bars = vec![bar(0, 10.0, 10.0, 10.0), bar(1, 15.0, 14.0, 14.5)];
        let out = atr(&bars, 1);
        // max(1, |15-10|, |14-10|) = 5
        assert!((out[1].unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_wilder_smoothing() {
        let bars = vec![
            bar(0, 10.0, 10.0, 10.0),
            bar(1, 11.0, 9.0, 10.0), // TR 2
            bar(2, 12.0, 8.0, 10.0), // TR 4
            bar(3, 10.0, 10.0, 10.0), // TR 0
        ];
        let out = atr(&bars, 2);
        assert!((out[2].unwrap() - 3.0).abs() < 1e-9);
        assert!((out[3].unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_too_short() {
        let bars = vec![bar(0, 1.0, 1.0, 1.0)];
        assert_eq!(atr(&bars, 14), vec![None]);
    }
}
