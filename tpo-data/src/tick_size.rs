//! Volatility-scaled price bucket width.
//!
//! The tick size is derived from the rolling standard deviation of closes over the
//! most recent half of a window, so the number of price levels in a profile stays
//! roughly stable across instruments and regimes.

use tracing::debug;

use crate::{bar::BarSequence, error::DataError};

/// Fraction of the mean rolling deviation used as bucket width.
pub const TICK_DAMPING: f64 = 0.25;

/// Estimate a price bucket width from the latter half of `bars`.
///
/// Uses the sample (n - 1) standard deviation of `close` over rolling windows of
/// `freq` bars. The result is rounded up and never below 1.
pub fn estimate_tick_size(bars: &BarSequence, freq: usize) -> Result<u64, DataError> {
    if freq < 2 {
        return Err(DataError::InvalidParameter(format!(
            "rolling window must span at least 2 bars, got {freq}"
        )));
    }

    let tail = bars.tail(bars.len() / 2);
    if tail.len() < freq + 1 {
        return Err(DataError::InsufficientData {
            needed: freq + 1,
            available: tail.len(),
        });
    }

    let closes: Vec<f64> = tail.iter().map(|bar| bar.close).collect();
    let deviations: Vec<f64> = closes.windows(freq).map(sample_std_dev).collect();
    let mean = deviations.iter().sum::<f64>() / deviations.len() as f64;

    let tick_size = ((mean * TICK_DAMPING).ceil() as u64).max(1);
    debug!(freq, windows = deviations.len(), mean_std = mean, tick_size, "estimated tick size");

    Ok(tick_size)
}

fn sample_std_dev(window: &[f64]) -> f64 {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|value| {
            let diff = value - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1.0);

    variance.sqrt()
}
