//! Position: the mutable state of one simulated trade.
//!
//! Positions are created and mutated only by the lifecycle engine. Outside
//! the engine they are visible through shared references.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ratchet::RatchetState;
use crate::config::RegimeParams;
use crate::domain::{Direction, ExitReason, PartialFill, PositionId, Regime, TradeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Open,
    PartiallyClosed,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    /// Index of the candle whose close opened the position.
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    /// Cost-adjusted entry fill.
    pub entry_price: f64,
    pub direction: Direction,
    /// Frozen at entry.
    pub regime: Regime,
    pub initial_sl: f64,
    stop: RatchetState,
    pub tp_prices: [f64; 3],
    pub tp_hit: [bool; 3],
    pub close_fractions: [f64; 3],
    pub trailing_active: bool,
    /// Trailing distance as a fraction (0.015 = 1.5%).
    pub trailing_distance: f64,
    /// Highest high (LONG) or lowest low (SHORT) since entry.
    pub trailing_reference_price: f64,
    pub position_remaining: f64,
    pub total_pnl_pct: f64,
    pub swap_pct: f64,
    pub swap_days_charged: i64,
    pub timeout_deadline: DateTime<Utc>,
    pub fills: Vec<PartialFill>,
    pub state: PositionState,
}

impl Position {
    /// Build a position from an already cost-adjusted entry fill.
    ///
    /// TP prices are offset from the fill in the position's favor.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn open(
        id: PositionId,
        entry_index: usize,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        direction: Direction,
        regime: Regime,
        stop_loss: f64,
        params: &RegimeParams,
        point_size: f64,
    ) -> Self {
        let sign = direction.sign();
        let tp_prices = params
            .tp_offsets
            .map(|off| entry_price + sign * params.tp_mode.distance(off, entry_price, point_size));
        Self {
            id,
            entry_index,
            entry_time,
            entry_price,
            direction,
            regime,
            initial_sl: stop_loss,
            stop: RatchetState::new(direction, stop_loss),
            tp_prices,
            tp_hit: [false; 3],
            close_fractions: params.close_fractions,
            trailing_active: false,
            trailing_distance: params.trailing_distance_pct / 100.0,
            trailing_reference_price: entry_price,
            position_remaining: 1.0,
            total_pnl_pct: 0.0,
            swap_pct: 0.0,
            swap_days_charged: 0,
            timeout_deadline: entry_time + params.timeout(),
            fills: Vec::new(),
            state: PositionState::Open,
        }
    }

    pub fn sl_price(&self) -> f64 {
        self.stop.level()
    }

    pub(crate) fn stop(&self) -> &RatchetState {
        &self.stop
    }

    pub fn is_closed(&self) -> bool {
        self.state == PositionState::Closed
    }

    /// Sum of the fractions realized so far.
    pub fn closed_fraction(&self) -> f64 {
        self.fills.iter().map(|f| f.fraction).sum()
    }

    /// Highest take-profit level reached, if any.
    pub fn highest_tp_reason(&self) -> Option<ExitReason> {
        (0..3)
            .rev()
            .find(|&i| self.tp_hit[i])
            .and_then(ExitReason::take_profit)
    }

    /// Open P&L of the remaining size marked at `mark`, in percent.
    pub fn unrealized_pct(&self, mark: f64) -> f64 {
        self.slice_gross_pct(mark, self.position_remaining)
    }

    /// Total realized plus open P&L marked at `mark`.
    pub fn marked_pnl_pct(&self, mark: f64) -> f64 {
        self.total_pnl_pct + self.unrealized_pct(mark)
    }

    fn slice_gross_pct(&self, price: f64, fraction: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.direction.sign() * (price - self.entry_price) / self.entry_price * 100.0 * fraction
    }

    // ─── Engine-only mutation ───────────────────────────────────────

    /// Move the trailing reference to the candle's favorable extreme.
    pub(crate) fn update_reference(&mut self, high: f64, low: f64) {
        self.trailing_reference_price = match self.direction {
            Direction::Long => self.trailing_reference_price.max(high),
            Direction::Short => self.trailing_reference_price.min(low),
        };
    }

    /// Candidate stop `reference * (1 ∓ distance)`.
    pub(crate) fn trailing_candidate(&self) -> f64 {
        self.trailing_reference_price * (1.0 - self.direction.sign() * self.trailing_distance)
    }

    /// Offer a stop level to the ratchet.
    pub(crate) fn propose_stop(&mut self, proposed: f64) -> f64 {
        self.stop.apply(proposed)
    }

    /// Realize `fraction` of the original size at the cost-adjusted `price`.
    pub(crate) fn realize(
        &mut self,
        time: DateTime<Utc>,
        reason: ExitReason,
        fraction: f64,
        price: f64,
        commission_pct: f64,
    ) -> PartialFill {
        let pnl_pct = self.slice_gross_pct(price, fraction) - commission_pct;
        debug_assert!(pnl_pct.is_finite(), "slice P&L is not finite");
        self.position_remaining = (self.position_remaining - fraction).max(0.0);
        self.total_pnl_pct += pnl_pct;
        self.state = PositionState::PartiallyClosed;
        let fill = PartialFill {
            position_id: self.id,
            time,
            reason,
            fraction,
            price,
            pnl_pct,
        };
        self.fills.push(fill.clone());
        fill
    }

    /// Whole 24h periods held at `time` that have not yet been charged.
    pub(crate) fn uncharged_swap_days(&self, time: DateTime<Utc>) -> i64 {
        let held = (time - self.entry_time).num_seconds().max(0) / Duration::days(1).num_seconds();
        held - self.swap_days_charged
    }

    pub(crate) fn accrue_swap(&mut self, days: i64, pct: f64) {
        debug_assert!(pct.is_finite(), "swap is not finite");
        self.swap_days_charged += days;
        self.swap_pct += pct;
        self.total_pnl_pct += pct;
    }

    /// Transition to `Closed` and snapshot the record.
    pub(crate) fn close(&mut self, exit_time: DateTime<Utc>, reason: ExitReason) -> TradeRecord {
        debug_assert!(!self.is_closed(), "position {} closed twice", self.id);
        self.state = PositionState::Closed;
        let exit_price = self.fills.last().map_or(self.entry_price, |f| f.price);
        TradeRecord {
            id: self.id,
            direction: self.direction,
            regime: self.regime,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            initial_sl: self.initial_sl,
            exit_time,
            exit_price,
            final_sl: self.sl_price(),
            exit_reason: reason,
            tp1_hit: self.tp_hit[0],
            tp2_hit: self.tp_hit[1],
            tp3_hit: self.tp_hit[2],
            trailing_used: self.trailing_active,
            pnl_pct: self.total_pnl_pct,
            swap_pct: self.swap_pct,
            duration_secs: (exit_time - self.entry_time).num_seconds(),
            partial_count: self.fills.len(),
        }
    }
}
