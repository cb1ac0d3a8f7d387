//! Error and rejection types for the core engine.
//!
//! Only configuration problems are hard errors. Bad candles and malformed
//! signals are rejections: the simulation logs them, counts them and moves on.

use thiserror::Error;

use crate::domain::Direction;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Invalid(String),
}

/// Why a signal did not produce a position.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SignalRejection {
    #[error("{direction} signal has no stop-loss")]
    MissingStop { direction: Direction },

    #[error("{direction} signal stop {stop} gives non-positive risk from entry {entry}")]
    NonPositiveRisk {
        direction: Direction,
        entry: f64,
        stop: f64,
    },

    #[error("{direction} signal stop {stop} is not finite")]
    NonFiniteStop { direction: Direction, stop: f64 },
}

/// Why a candle was skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleRejection {
    #[error("candle OHLC is missing, non-finite or inconsistent")]
    Insane,

    #[error("timestamp {time} is not after previous {previous}")]
    NonMonotonic { time: String, previous: String },
}
