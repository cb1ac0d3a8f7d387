//! Position lifecycle engine: advances every open position by one candle.
//!
//! Per-candle order for each open position (this order defines tie-breaks):
//!
//! 0. Swap accrual for each newly completed 24h period.
//! 1. Timeout: close the remainder at the candle close, stop.
//! 2. Stop: update the trailing reference, ratchet the stop if trailing is
//!    active, then close the remainder at the stop if the candle breaches it.
//! 3. Take-profits TP1 → TP2 → TP3, each independently. TP1 activates trailing.
//! 4. Closure once the remaining size is within epsilon of zero.
//!
//! The engine owns the open collection. Callers receive closed records and
//! partial fills by value and can only observe open positions through `&[Position]`.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::position::Position;
use crate::config::EngineConfig;
use crate::cost::{CostModel, FillSide};
use crate::domain::{
    Candle, Direction, ExitReason, PartialFill, PositionId, Regime, Signal, TradeRecord,
};
use crate::error::SignalRejection;

/// Result of offering a signal to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Opened(PositionId),
    /// The annotation carried no direction.
    NoSignal,
    Rejected(SignalRejection),
    /// `max_positions` reached; the signal is dropped.
    AtCapacity,
}

/// Everything realized on one candle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub partials: Vec<PartialFill>,
    pub closed: Vec<TradeRecord>,
}

impl StepOutcome {
    pub fn is_empty(&self) -> bool {
        self.partials.is_empty() && self.closed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleEngine {
    config: EngineConfig,
    open: Vec<Position>,
    next_id: u64,
}

impl LifecycleEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            open: Vec::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.open.len() < self.config.max_positions
    }

    /// Open a position at the candle's close if the signal is well-formed and
    /// capacity allows. `classify` is only called for admitted signals.
    pub fn try_open<F>(
        &mut self,
        index: usize,
        candle: &Candle,
        signal: &Signal,
        classify: F,
    ) -> Admission
    where
        F: FnOnce() -> Regime,
    {
        let Some(direction) = signal.direction.as_direction() else {
            return Admission::NoSignal;
        };
        let stop = match validate_stop(direction, candle.close, signal.stop_loss) {
            Ok(stop) => stop,
            Err(rejection) => return Admission::Rejected(rejection),
        };
        if !self.has_capacity() {
            return Admission::AtCapacity;
        }

        let regime = classify();
        let params = self.config.params_for(regime);
        let costs = &self.config.costs;
        let entry_price = costs.execution_price(candle.close, direction, FillSide::Open);
        let id = PositionId(self.next_id);
        self.next_id += 1;

        let position = Position::open(
            id,
            index,
            candle.time,
            entry_price,
            direction,
            regime,
            stop,
            params,
            costs.point_size,
        );
        debug!(
            %id, %direction, %regime, entry_price, stop,
            tp1 = position.tp_prices[0],
            tp2 = position.tp_prices[1],
            tp3 = position.tp_prices[2],
            "position opened"
        );
        self.open.push(position);
        Admission::Opened(id)
    }

    /// Advance every position opened before candle `index`.
    pub fn step(&mut self, index: usize, candle: &Candle) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        let costs = &self.config.costs;
        let epsilon = self.config.epsilon;

        let mut still_open = Vec::with_capacity(self.open.len());
        for mut position in self.open.drain(..) {
            if position.entry_index >= index {
                still_open.push(position);
                continue;
            }
            match advance(&mut position, candle, costs, epsilon, &mut outcome.partials) {
                Some(record) => outcome.closed.push(record),
                None => still_open.push(position),
            }
        }
        self.open = still_open;
        outcome
    }

    /// Force-close every open position at the candle's close.
    pub fn close_all(&mut self, candle: &Candle, reason: ExitReason) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        let costs = &self.config.costs;
        for mut position in self.open.drain(..) {
            let price = costs.execution_price(candle.close, position.direction, FillSide::Close);
            let record = close_remaining(
                &mut position,
                candle.time,
                reason,
                price,
                costs,
                &mut outcome.partials,
            );
            outcome.closed.push(record);
        }
        outcome
    }
}

/// Reject a missing, non-finite or zero/negative-distance stop.
pub fn validate_stop(
    direction: Direction,
    entry: f64,
    stop_loss: Option<f64>,
) -> Result<f64, SignalRejection> {
    let stop = stop_loss.ok_or(SignalRejection::MissingStop { direction })?;
    if !stop.is_finite() {
        return Err(SignalRejection::NonFiniteStop { direction, stop });
    }
    let risk = direction.sign() * (entry - stop);
    if risk.is_nan() || risk <= 0.0 {
        return Err(SignalRejection::NonPositiveRisk {
            direction,
            entry,
            stop,
        });
    }
    Ok(stop)
}

/// Returns true if the candle's favorable extreme reaches `target`.
fn reaches(direction: Direction, candle: &Candle, target: f64) -> bool {
    match direction {
        Direction::Long => candle.high >= target,
        Direction::Short => candle.low <= target,
    }
}

/// One candle for one position. Returns the record if the position closed.
fn advance(
    position: &mut Position,
    candle: &Candle,
    costs: &CostModel,
    epsilon: f64,
    partials: &mut Vec<PartialFill>,
) -> Option<TradeRecord> {
    let direction = position.direction;

    let days = position.uncharged_swap_days(candle.time);
    if days > 0 {
        let pct = costs.swap_pct(direction, days, position.position_remaining);
        position.accrue_swap(days, pct);
    }

    if candle.time >= position.timeout_deadline {
        let price = costs.execution_price(candle.close, direction, FillSide::Close);
        return Some(close_remaining(
            position,
            candle.time,
            ExitReason::Timeout,
            price,
            costs,
            partials,
        ));
    }

    position.update_reference(candle.high, candle.low);
    if position.trailing_active {
        position.propose_stop(position.trailing_candidate());
    }
    if position.stop().is_breached(candle) {
        let reason = if position.trailing_active {
            ExitReason::TrailingSl
        } else {
            ExitReason::Sl
        };
        let price = costs.execution_price(position.sl_price(), direction, FillSide::Close);
        return Some(close_remaining(position, candle.time, reason, price, costs, partials));
    }

    let levels = [ExitReason::Tp1, ExitReason::Tp2, ExitReason::Tp3];
    for (level, reason) in levels.into_iter().enumerate() {
        let target = position.tp_prices[level];
        if position.tp_hit[level] || !reaches(direction, candle, target) {
            continue;
        }
        position.tp_hit[level] = true;
        let fraction = position.close_fractions[level].min(position.position_remaining);
        if fraction > 0.0 {
            let price = costs.execution_price(target, direction, FillSide::Close);
            let commission = costs.commission_pct(fraction, position.entry_price);
            let fill = position.realize(candle.time, reason, fraction, price, commission);
            debug!(
                id = %position.id,
                %reason,
                fraction,
                price,
                remaining = position.position_remaining,
                "partial close"
            );
            partials.push(fill);
        }
        if level == 0 {
            position.trailing_active = true;
            let candidate = position.trailing_candidate();
            let seed = breakeven_floor(direction, candidate, position.entry_price);
            position.propose_stop(seed);
        }
    }

    if position.position_remaining <= epsilon {
        let reason = position.highest_tp_reason().unwrap_or(ExitReason::Tp3);
        return Some(finish(position, candle.time, reason));
    }
    None
}

/// Seeded trailing stop is never worse than break-even.
fn breakeven_floor(direction: Direction, candidate: f64, entry: f64) -> f64 {
    match direction {
        Direction::Long => candidate.max(entry),
        Direction::Short => candidate.min(entry),
    }
}

fn close_remaining(
    position: &mut Position,
    time: DateTime<Utc>,
    reason: ExitReason,
    price: f64,
    costs: &CostModel,
    partials: &mut Vec<PartialFill>,
) -> TradeRecord {
    let fraction = position.position_remaining;
    if fraction > 0.0 {
        let commission = costs.commission_pct(fraction, position.entry_price);
        partials.push(position.realize(time, reason, fraction, price, commission));
    }
    finish(position, time, reason)
}

fn finish(position: &mut Position, time: DateTime<Utc>, reason: ExitReason) -> TradeRecord {
    debug_assert!(
        (position.closed_fraction() + position.position_remaining - 1.0).abs() < 1e-9,
        "size not conserved for {}",
        position.id
    );
    let record = position.close(time, reason);
    debug!(
        id = %record.id,
        reason = %record.exit_reason,
        pnl_pct = record.pnl_pct,
        "position closed"
    );
    record
}
