//! TradeRecord: the immutable snapshot of a fully closed position.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::PositionId;
use super::signal::{Direction, Regime};

/// Why a slice or a whole position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    Sl,
    TrailingSl,
    Tp1,
    Tp2,
    Tp3,
    Timeout,
    EndOfData,
}

impl ExitReason {
    pub const ALL: [ExitReason; 7] = [
        ExitReason::Sl,
        ExitReason::TrailingSl,
        ExitReason::Tp1,
        ExitReason::Tp2,
        ExitReason::Tp3,
        ExitReason::Timeout,
        ExitReason::EndOfData,
    ];

    /// Take-profit reason for level index 0..=2.
    pub fn take_profit(level: usize) -> Option<Self> {
        match level {
            0 => Some(ExitReason::Tp1),
            1 => Some(ExitReason::Tp2),
            2 => Some(ExitReason::Tp3),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Sl => "SL",
            ExitReason::TrailingSl => "TRAILING_SL",
            ExitReason::Tp1 => "TP1",
            ExitReason::Tp2 => "TP2",
            ExitReason::Tp3 => "TP3",
            ExitReason::Timeout => "TIMEOUT",
            ExitReason::EndOfData => "END_OF_DATA",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == code)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One realized slice of a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialFill {
    pub position_id: PositionId,
    pub time: DateTime<Utc>,
    pub reason: ExitReason,
    /// Fraction of the original size closed by this slice.
    pub fraction: f64,
    /// Cost-adjusted execution price.
    pub price: f64,
    /// Weighted P&L contribution in percent, net of commission.
    pub pnl_pct: f64,
}

/// A completed position from entry to full closure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub id: PositionId,
    pub direction: Direction,
    pub regime: Regime,

    // ── Entry ──
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub initial_sl: f64,

    // ── Exit ──
    pub exit_time: DateTime<Utc>,
    /// Execution price of the final slice.
    pub exit_price: f64,
    pub final_sl: f64,
    pub exit_reason: ExitReason,

    // ── Levels ──
    pub tp1_hit: bool,
    pub tp2_hit: bool,
    pub tp3_hit: bool,
    pub trailing_used: bool,

    // ── PnL ──
    /// Total P&L in percent of the entry notional, slices plus swap.
    pub pnl_pct: f64,
    /// Swap/carry included in `pnl_pct`.
    pub swap_pct: f64,

    // ── Duration ──
    pub duration_secs: i64,
    pub partial_count: usize,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl_pct > 0.0
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_secs as f64 / 3600.0
    }

    /// Number of take-profit levels reached.
    pub fn tp_hits(&self) -> usize {
        [self.tp1_hit, self.tp2_hit, self.tp3_hit]
            .iter()
            .filter(|&&h| h)
            .count()
    }
}
