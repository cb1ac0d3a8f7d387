//! Rolling means, including the rolling mean of candle range (`high - low`).

use crate::domain::Candle;

/// Simple rolling mean. NaN before index `period - 1`.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum: f64 = values[..period].iter().sum();
    result[period - 1] = sum / period as f64;
    for i in period..n {
        sum += values[i] - values[i - period];
        result[i] = sum / period as f64;
    }
    result
}

/// Rolling mean of `high - low` over `period` candles.
pub fn rolling_mean_range(candles: &[Candle], period: usize) -> Vec<f64> {
    let ranges: Vec<f64> = candles.iter().map(Candle::range).collect();
    rolling_mean(&ranges, period)
}
