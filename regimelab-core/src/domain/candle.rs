//! Candle: one timestamped OHLC observation of the replayed instrument.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLC candle with optional volume.
///
/// Candles are owned by the input stream. The engine reads them and never
/// mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl Candle {
    pub fn new(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// OHLC sanity: finite, positive, and open/close inside `[low, high]`.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
    }

    /// Candle range `high - low`.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}
