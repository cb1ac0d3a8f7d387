//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (span + 1).
//! Seed: EMA[period-1] = SMA of the first `period` values.

/// EMA over an arbitrary series.
///
/// Returns a vector the same length as `values`, NaN before the seed index.
/// A NaN input taints every value from that point on.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n < period || period == 0 {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);

    let mut sum = 0.0;
    for &v in values.iter().take(period) {
        if v.is_nan() {
            return result;
        }
        sum += v;
    }
    let seed = sum / period as f64;
    result[period - 1] = seed;

    let mut prev = seed;
    for (i, &v) in values.iter().enumerate().skip(period) {
        if v.is_nan() {
            return result;
        }
        prev = alpha * v + (1.0 - alpha) * prev;
        result[i] = prev;
    }

    result
}

/// Last finite EMA value of `values`, if the series is long enough.
pub fn last_ema(values: &[f64], period: usize) -> Option<f64> {
    ema_of_series(values, period)
        .last()
        .copied()
        .filter(|v| v.is_finite())
}
