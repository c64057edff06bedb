//! Technical indicators over a price series.
//!
//! Indicators are pure functions: price history in, numeric series out, one
//! value per point. `f64::NAN` marks positions where the indicator is
//! undefined (not enough history, or a division by zero); it is never
//! replaced by zero or any other stand-in.

pub mod annotate;
pub mod rsi;
pub mod signals;
pub mod sma;

pub use annotate::{annotate, AnnotatedRow, AnnotatedSeries, IndicatorEngine, IndicatorSet};
pub use rsi::Rsi;
pub use signals::{RsiBand, Trend, VolumeLevel};
pub use sma::Sma;

use crate::domain::PricePoint;

/// Trait for indicators.
///
/// `compute` returns a `Vec<f64>` of the same length as `points`; the first
/// `lookback()` values are `f64::NAN`.
///
/// No value at position t may depend on data after t.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of points needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    fn compute(&self, points: &[PricePoint]) -> Vec<f64>;
}

/// Trailing mean over `window` values ending at each index, inclusive.
///
/// NaN until the window is full; NaN wherever the window contains a NaN.
///
/// Each window is summed from scratch so a window of zeros averages to
/// exactly zero (RSI's avg_loss == 0 check depends on it).
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || n < window {
        return result;
    }

    for (i, slot) in result.iter_mut().enumerate().skip(window - 1) {
        let w = &values[i + 1 - window..=i];
        if w.iter().any(|v| v.is_nan()) {
            continue;
        }
        *slot = w.iter().sum::<f64>() / window as f64;
    }

    result
}

/// Build points from close prices for testing.
///
/// open = previous close (or close for the first point),
/// high/low = max/min(open, close) ± 1, volume = 1000.
#[cfg(test)]
pub fn make_points(closes: &[f64]) -> Vec<PricePoint> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PricePoint {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: Some(1000),
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
