//! Regime classifier: five-heuristic majority vote over a candle window.
//!
//! Each heuristic is a boolean computed independently over the most recent
//! `lookback` candles. Three or more true votes classify the window as TREND.
//! Windows shorter than `lookback` are never classified and resolve to RANGE.
//!
//! Every ratio guards its denominator: an empty price range or a zero average
//! yields a ratio of 0, which votes false.

use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Regime};
use crate::error::ConfigError;
use crate::indicators::{ema::last_ema, rolling_mean_range};

/// Votes needed for TREND.
pub const TREND_QUORUM: usize = 3;

/// Tunable thresholds for the five heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Window length N. Fewer candles than this resolves to RANGE.
    pub lookback: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    /// Relative EMA gap, as a fraction (0.004 = 0.4%).
    pub ema_threshold: f64,
    pub volatility_period: usize,
    pub volatility_multiplier: f64,
    pub directional_threshold: f64,
    pub sequential_threshold: f64,
    pub structural_window: usize,
    pub structural_min_count: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            lookback: 100,
            ema_fast: 20,
            ema_slow: 50,
            ema_threshold: 0.004,
            volatility_period: 14,
            volatility_multiplier: 1.08,
            directional_threshold: 0.38,
            sequential_threshold: 0.18,
            structural_window: 20,
            structural_min_count: 12,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback == 0 {
            return Err(ConfigError::Invalid("classifier.lookback must be > 0".into()));
        }
        if self.ema_fast == 0 || self.ema_slow == 0 || self.volatility_period == 0 {
            return Err(ConfigError::Invalid("classifier periods must be > 0".into()));
        }
        let longest = self
            .ema_slow
            .max(self.ema_fast)
            .max(self.volatility_period)
            .max(self.structural_window);
        if longest > self.lookback {
            return Err(ConfigError::Invalid(format!(
                "classifier.lookback ({}) shorter than longest period ({longest})",
                self.lookback
            )));
        }
        for (name, v) in [
            ("ema_threshold", self.ema_threshold),
            ("volatility_multiplier", self.volatility_multiplier),
            ("directional_threshold", self.directional_threshold),
            ("sequential_threshold", self.sequential_threshold),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "classifier.{name} must be finite and >= 0, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// The five heuristic outcomes for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeVotes {
    pub ema_trend: bool,
    pub volatility: bool,
    pub directional: bool,
    pub sequential: bool,
    pub structural: bool,
}

impl RegimeVotes {
    pub fn count(&self) -> usize {
        [
            self.ema_trend,
            self.volatility,
            self.directional,
            self.sequential,
            self.structural,
        ]
        .iter()
        .filter(|&&v| v)
        .count()
    }

    /// Fixed unweighted majority.
    pub fn regime(&self) -> Regime {
        if self.count() >= TREND_QUORUM {
            Regime::Trend
        } else {
            Regime::Range
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: ClassifierConfig,
}

impl RegimeClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify the most recent `lookback` candles of `history`.
    pub fn classify(&self, history: &[Candle]) -> Regime {
        self.votes(history)
            .map(|v| v.regime())
            .unwrap_or(Regime::Range)
    }

    /// Votes over the most recent `lookback` candles, or `None` if the
    /// history is too short to classify.
    pub fn votes(&self, history: &[Candle]) -> Option<RegimeVotes> {
        let n = self.config.lookback;
        if n == 0 || history.len() < n {
            return None;
        }
        let window = &history[history.len() - n..];
        let c = &self.config;
        Some(RegimeVotes {
            ema_trend: ema_gap_ratio(window, c.ema_fast, c.ema_slow) > c.ema_threshold,
            volatility: volatility_expanding(window, c.volatility_period, c.volatility_multiplier),
            directional: directional_ratio(window) > c.directional_threshold,
            sequential: sequential_bias(window) > c.sequential_threshold,
            structural: structural_count(window, c.structural_window) > c.structural_min_count,
        })
    }
}

// ─── Individual heuristics ──────────────────────────────────────────

/// `|EMA_fast - EMA_slow| / EMA_slow` on closes. 0 if either EMA is unavailable.
pub fn ema_gap_ratio(window: &[Candle], fast: usize, slow: usize) -> f64 {
    let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
    match (last_ema(&closes, fast), last_ema(&closes, slow)) {
        (Some(f), Some(s)) => safe_ratio((f - s).abs(), s.abs()),
        _ => 0.0,
    }
}

/// True if the current rolling mean range exceeds the window average of the
/// rolling series times `multiplier`.
pub fn volatility_expanding(window: &[Candle], period: usize, multiplier: f64) -> bool {
    let rolling = rolling_mean_range(window, period);
    let valid: Vec<f64> = rolling.iter().copied().filter(|v| v.is_finite()).collect();
    let Some(&current) = valid.last() else {
        return false;
    };
    let average = valid.iter().sum::<f64>() / valid.len() as f64;
    if average <= 0.0 {
        return false;
    }
    current > average * multiplier
}

/// `|close[last] - close[first]| / (max(high) - min(low))`.
pub fn directional_ratio(window: &[Candle]) -> f64 {
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return 0.0;
    };
    let max_high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let min_low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    safe_ratio((last.close - first.close).abs(), max_high - min_low)
}

/// `|ups - downs| / (ups + downs)` over consecutive closes. Flat moves are ignored.
pub fn sequential_bias(window: &[Candle]) -> f64 {
    let (mut ups, mut downs) = (0usize, 0usize);
    for pair in window.windows(2) {
        if pair[1].close > pair[0].close {
            ups += 1;
        } else if pair[1].close < pair[0].close {
            downs += 1;
        }
    }
    safe_ratio(ups.abs_diff(downs) as f64, (ups + downs) as f64)
}

/// Over the last `span` candles, the larger of the strictly-higher-high
/// count and the strictly-lower-low count.
pub fn structural_count(window: &[Candle], span: usize) -> usize {
    let tail = &window[window.len().saturating_sub(span)..];
    let (mut higher_highs, mut lower_lows) = (0usize, 0usize);
    for pair in tail.windows(2) {
        if pair[1].high > pair[0].high {
            higher_highs += 1;
        }
        if pair[1].low < pair[0].low {
            lower_lows += 1;
        }
    }
    higher_highs.max(lower_lows)
}

/// `num / den`, or 0 when the denominator is zero, negative or non-finite.
fn safe_ratio(num: f64, den: f64) -> f64 {
    if !den.is_finite() || den <= 0.0 || !num.is_finite() {
        return 0.0;
    }
    num / den
}
