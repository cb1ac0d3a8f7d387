//! Engine configuration: capacity, tolerances, classifier thresholds,
//! per-regime exit parameters and costs.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::cost::{CostModel, OffsetMode};
use crate::domain::Regime;
use crate::error::ConfigError;
use crate::regime::ClassifierConfig;

/// Upper bound on `timeout_hours`: 100 years.
pub const MAX_TIMEOUT_HOURS: f64 = 876_600.0;

/// Exit parameters selected by the regime frozen at entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeParams {
    #[serde(default)]
    pub tp_mode: OffsetMode,
    /// TP1/TP2/TP3 distances from the entry fill, in `tp_mode` units.
    pub tp_offsets: [f64; 3],
    /// Fractions of the original size closed at TP1/TP2/TP3.
    pub close_fractions: [f64; 3],
    /// Trailing distance in percent (1.5 = 1.5%).
    pub trailing_distance_pct: f64,
    pub timeout_hours: f64,
}

impl RegimeParams {
    pub fn trend_default() -> Self {
        Self {
            tp_mode: OffsetMode::Percent,
            tp_offsets: [1.0, 2.0, 3.5],
            close_fractions: [0.5, 0.3, 0.2],
            trailing_distance_pct: 1.0,
            timeout_hours: 72.0,
        }
    }

    pub fn range_default() -> Self {
        Self {
            tp_mode: OffsetMode::Percent,
            tp_offsets: [0.5, 1.0, 1.5],
            close_fractions: [0.5, 0.3, 0.2],
            trailing_distance_pct: 0.5,
            timeout_hours: 24.0,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::milliseconds((self.timeout_hours * 3_600_000.0).round() as i64)
    }

    pub fn validate(&self, label: &str) -> Result<(), ConfigError> {
        let mut prev = 0.0;
        for (i, &off) in self.tp_offsets.iter().enumerate() {
            if !(off.is_finite() && off > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{label}.tp_offsets[{i}] must be > 0, got {off}"
                )));
            }
            if off < prev {
                return Err(ConfigError::Invalid(format!(
                    "{label}.tp_offsets must be non-decreasing"
                )));
            }
            prev = off;
        }
        for (i, &frac) in self.close_fractions.iter().enumerate() {
            if !(frac.is_finite() && (0.0..=1.0).contains(&frac)) {
                return Err(ConfigError::Invalid(format!(
                    "{label}.close_fractions[{i}] must be in [0, 1], got {frac}"
                )));
            }
        }
        let total: f64 = self.close_fractions.iter().sum();
        if total > 1.0 + 1e-9 {
            return Err(ConfigError::Invalid(format!(
                "{label}.close_fractions sum to {total}, more than 1"
            )));
        }
        if !(self.trailing_distance_pct.is_finite()
            && self.trailing_distance_pct > 0.0
            && self.trailing_distance_pct < 100.0)
        {
            return Err(ConfigError::Invalid(format!(
                "{label}.trailing_distance_pct must be in (0, 100), got {}",
                self.trailing_distance_pct
            )));
        }
        if !(self.timeout_hours.is_finite()
            && self.timeout_hours > 0.0
            && self.timeout_hours <= MAX_TIMEOUT_HOURS)
        {
            return Err(ConfigError::Invalid(format!(
                "{label}.timeout_hours must be in (0, {MAX_TIMEOUT_HOURS}], got {}",
                self.timeout_hours
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_positions: usize,
    /// Remaining-size tolerance for full closure.
    pub epsilon: f64,
    /// Force-close positions still open when the stream ends.
    pub close_at_end: bool,
    pub classifier: ClassifierConfig,
    pub trend: RegimeParams,
    pub range: RegimeParams,
    pub costs: CostModel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_positions: 3,
            epsilon: 0.01,
            close_at_end: true,
            classifier: ClassifierConfig::default(),
            trend: RegimeParams::trend_default(),
            range: RegimeParams::range_default(),
            costs: CostModel::frictionless(),
        }
    }
}

impl EngineConfig {
    pub fn params_for(&self, regime: Regime) -> &RegimeParams {
        match regime {
            Regime::Trend => &self.trend,
            Regime::Range => &self.range,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_positions == 0 {
            return Err(ConfigError::Invalid("max_positions must be >= 1".into()));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0 && self.epsilon < 0.5) {
            return Err(ConfigError::Invalid(format!(
                "epsilon must be in (0, 0.5), got {}",
                self.epsilon
            )));
        }
        self.classifier.validate()?;
        self.trend.validate("trend")?;
        self.range.validate("range")?;
        self.costs.validate()
    }
}
