//! Cost model: spread, commission and swap.
//!
//! Spread is directional: the side that buys (opening a LONG, closing a SHORT)
//! pays `nominal + spread`; the side that sells receives `nominal - spread`.
//! Commission is deducted from realized P&L in proportion to the closed fraction.
//! Swap accrues once per full 24 hours held on the remaining fraction.
//!
//! `execution_price` is called exactly once per executed price.

use serde::{Deserialize, Serialize};

use crate::domain::Direction;
use crate::error::ConfigError;

/// How a price offset is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMode {
    /// Percent of the reference price (1.0 = 1%).
    #[default]
    Percent,
    /// Multiples of the instrument's point size.
    Points,
}

impl OffsetMode {
    /// Absolute price distance for `value` at `reference`.
    pub fn distance(self, value: f64, reference: f64, point_size: f64) -> f64 {
        match self {
            OffsetMode::Percent => reference * value / 100.0,
            OffsetMode::Points => value * point_size,
        }
    }
}

/// Whether a fill opens or closes exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillSide {
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub spread_mode: OffsetMode,
    pub spread: f64,
    pub commission_mode: OffsetMode,
    /// Per-close commission: percent of notional, or points per unit.
    pub commission: f64,
    /// Daily carry in percent for LONG positions. Negative is a cost.
    pub swap_long_pct_per_day: f64,
    /// Daily carry in percent for SHORT positions. Negative is a cost.
    pub swap_short_pct_per_day: f64,
    pub point_size: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::frictionless()
    }
}

impl CostModel {
    pub fn frictionless() -> Self {
        Self {
            spread_mode: OffsetMode::Percent,
            spread: 0.0,
            commission_mode: OffsetMode::Percent,
            commission: 0.0,
            swap_long_pct_per_day: 0.0,
            swap_short_pct_per_day: 0.0,
            point_size: 1.0,
        }
    }

    pub fn with_spread(mut self, mode: OffsetMode, spread: f64) -> Self {
        self.spread_mode = mode;
        self.spread = spread;
        self
    }

    pub fn with_commission(mut self, mode: OffsetMode, commission: f64) -> Self {
        self.commission_mode = mode;
        self.commission = commission;
        self
    }

    pub fn with_swap(mut self, long_pct_per_day: f64, short_pct_per_day: f64) -> Self {
        self.swap_long_pct_per_day = long_pct_per_day;
        self.swap_short_pct_per_day = short_pct_per_day;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.point_size.is_finite() && self.point_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "costs.point_size must be > 0, got {}",
                self.point_size
            )));
        }
        for (name, v) in [("spread", self.spread), ("commission", self.commission)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "costs.{name} must be finite and >= 0, got {v}"
                )));
            }
        }
        if !(self.swap_long_pct_per_day.is_finite() && self.swap_short_pct_per_day.is_finite()) {
            return Err(ConfigError::Invalid("costs.swap rates must be finite".into()));
        }
        Ok(())
    }

    /// Apply spread to a nominal price.
    pub fn execution_price(&self, nominal: f64, direction: Direction, side: FillSide) -> f64 {
        let spread = self.spread_mode.distance(self.spread, nominal, self.point_size);
        let buys = matches!(
            (direction, side),
            (Direction::Long, FillSide::Open) | (Direction::Short, FillSide::Close)
        );
        if buys {
            nominal + spread
        } else {
            nominal - spread
        }
    }

    /// Commission in percent of the position's notional for closing `fraction`
    /// of the original size. `entry_price` is the entry fill, the same
    /// denominator the gross P&L of a slice uses.
    pub fn commission_pct(&self, fraction: f64, entry_price: f64) -> f64 {
        let per_unit_pct = match self.commission_mode {
            OffsetMode::Percent => self.commission,
            OffsetMode::Points => {
                if entry_price <= 0.0 {
                    return 0.0;
                }
                self.commission * self.point_size / entry_price * 100.0
            }
        };
        per_unit_pct * fraction
    }

    /// Carry in percent for `days` on `fraction` of the position.
    pub fn swap_pct(&self, direction: Direction, days: i64, fraction: f64) -> f64 {
        let rate = match direction {
            Direction::Long => self.swap_long_pct_per_day,
            Direction::Short => self.swap_short_pct_per_day,
        };
        rate * days as f64 * fraction
    }
}
