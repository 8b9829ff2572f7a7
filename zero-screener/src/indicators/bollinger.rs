//! Bollinger bands over an arbitrary (possibly gappy) input series.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::vwma::finite;

/// Lower, middle and upper band for one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub lower: Option<f64>,
    pub middle: Option<f64>,
    pub upper: Option<f64>,
}

/// Bands over the defined values of `input`, mapped back to their bars.
///
/// Undefined inputs are skipped rather than breaking windows. The lower
/// band uses `lower_std` deviations and the upper band `upper_std`;
/// deviation is the population standard deviation. When fewer than
/// `window` values are defined, every band is undefined.
pub fn bollinger(
    input: &[Option<f64>],
    window: usize,
    lower_std: f64,
    upper_std: f64,
) -> Vec<BollingerBands> {
    let window = window.max(1);
    let mut out = vec![BollingerBands::default(); input.len()];

    let (positions, values): (Vec<usize>, Vec<f64>) = input
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .unzip();

    if values.len() < window {
        return out;
    }

    for (end, chunk) in values.windows(window).enumerate() {
        let mean = Statistics::mean(chunk.iter());
        let std_dev = Statistics::population_std_dev(chunk.iter());
        out[positions[end + window - 1]] = BollingerBands {
            lower: finite(mean - lower_std * std_dev),
            middle: finite(mean),
            upper: finite(mean + upper_std * std_dev),
        };
    }
    out
}
