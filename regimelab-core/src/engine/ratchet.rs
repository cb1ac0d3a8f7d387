/// Ratchet invariant enforcement
///
/// **Core Rule:** a stop may tighten, never loosen.
///
/// Long positions: the stop can only rise. Short positions: it can only fall.
use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatchetState {
    level: f64,
    direction: Direction,
}

impl RatchetState {
    pub fn new(direction: Direction, initial_level: f64) -> Self {
        debug_assert!(initial_level.is_finite(), "stop level must be finite");
        Self {
            level: initial_level,
            direction,
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Apply the ratchet to a proposed stop level and return the resulting level.
    ///
    /// # Example
    /// ```
    /// use regimelab_core::domain::Direction;
    /// use regimelab_core::engine::RatchetState;
    ///
    /// let mut ratchet = RatchetState::new(Direction::Long, 95.0);
    /// assert_eq!(ratchet.apply(100.0), 100.0);
    /// // Loosening is blocked.
    /// assert_eq!(ratchet.apply(90.0), 100.0);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        debug_assert!(!proposed.is_nan(), "proposed stop is NaN");
        if self.direction.is_more_favorable(proposed, self.level) {
            self.level = proposed;
        }
        self.level
    }

    /// True if the candle's adverse extreme touches or crosses the stop.
    pub fn is_breached(&self, candle: &Candle) -> bool {
        match self.direction {
            Direction::Long => candle.low <= self.level,
            Direction::Short => candle.high >= self.level,
        }
    }
}
