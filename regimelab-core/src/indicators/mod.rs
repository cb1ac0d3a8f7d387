//! Indicator helpers used by the regime classifier.
//!
//! All helpers are pure functions over slices. Values before the first full
//! window are NaN, matching the usual lookback convention.

pub mod ema;
pub mod range;

pub use ema::ema_of_series;
pub use range::{rolling_mean, rolling_mean_range};

/// Create synthetic candles from close prices for testing.
///
/// open = prev_close (or close for the first candle),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0,
/// one candle per hour starting 2024-01-02 00:00 UTC.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<crate::domain::Candle> {
    use crate::domain::Candle;
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                base + chrono::Duration::hours(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
            )
        })
        .collect()
}

/// Assert two f64 values are approximately equal.
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
