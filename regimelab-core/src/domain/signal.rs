//! Entry signals, trade direction and market regime.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::candle::Candle;

/// Side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for Long, -1 for Short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// True if `candidate` is strictly better protection than `current` for this side.
    pub fn is_more_favorable(self, candidate: f64, current: f64) -> bool {
        match self {
            Direction::Long => candidate > current,
            Direction::Short => candidate < current,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Direction carried by a signal annotation. `None` means no entry on this candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    #[default]
    None,
    Long,
    Short,
}

impl SignalDirection {
    pub fn as_direction(self) -> Option<Direction> {
        match self {
            SignalDirection::None => None,
            SignalDirection::Long => Some(Direction::Long),
            SignalDirection::Short => Some(Direction::Short),
        }
    }
}

/// An entry signal produced by an external strategy component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: SignalDirection,
    pub stop_loss: Option<f64>,
}

impl Signal {
    pub fn long(stop_loss: f64) -> Self {
        Self {
            direction: SignalDirection::Long,
            stop_loss: Some(stop_loss),
        }
    }

    pub fn short(stop_loss: f64) -> Self {
        Self {
            direction: SignalDirection::Short,
            stop_loss: Some(stop_loss),
        }
    }
}

/// A candle paired with its (optional) entry signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedCandle {
    pub candle: Candle,
    #[serde(default)]
    pub signal: Option<Signal>,
}

impl AnnotatedCandle {
    pub fn plain(candle: Candle) -> Self {
        Self {
            candle,
            signal: None,
        }
    }

    pub fn with_signal(candle: Candle, signal: Signal) -> Self {
        Self {
            candle,
            signal: Some(signal),
        }
    }
}

/// Market regime, frozen per position at entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Regime {
    Trend,
    Range,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Trend => write!(f, "TREND"),
            Regime::Range => write!(f, "RANGE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_sign() {
        assert_eq!(Direction::Long.sign(), 1.0);
        assert_eq!(Direction::Short.sign(), -1.0);
    }

    #[test]
    fn favorable_stop_moves() {
        assert!(Direction::Long.is_more_favorable(101.0, 100.0));
        assert!(!Direction::Long.is_more_favorable(99.0, 100.0));
        assert!(Direction::Short.is_more_favorable(99.0, 100.0));
        assert!(!Direction::Short.is_more_favorable(100.0, 100.0));
    }

    #[test]
    fn signal_direction_maps_to_direction() {
        assert_eq!(SignalDirection::None.as_direction(), None);
        assert_eq!(SignalDirection::Long.as_direction(), Some(Direction::Long));
        assert_eq!(SignalDirection::Short.as_direction(), Some(Direction::Short));
    }

    #[test]
    fn signal_direction_serde_lowercase() {
        let json = serde_json::to_string(&SignalDirection::Short).unwrap();
        assert_eq!(json, "\"short\"");
    }

    #[test]
    fn regime_display() {
        assert_eq!(Regime::Trend.to_string(), "TREND");
        assert_eq!(Regime::Range.to_string(), "RANGE");
    }
}
