//! Candle-by-candle simulation loop.
//!
//! Per accepted candle:
//! 1. Admission: open a position if the signal is valid and capacity allows
//! 2. Lifecycle: advance every position opened on an earlier candle
//! 3. Ledger: record partial fills and closed trades
//! 4. Equity: realized + unrealized P&L marked at the candle close
//!
//! Each candle is fully applied before the next one is read. The loop never
//! reads the wall clock and holds no randomness, so identical inputs give
//! identical outputs.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::lifecycle::{Admission, LifecycleEngine};
use crate::config::EngineConfig;
use crate::domain::{AnnotatedCandle, Candle, ExitReason, PartialFill, TradeRecord};
use crate::error::{CandleRejection, ConfigError};
use crate::ledger::TradeLedger;
use crate::regime::RegimeClassifier;

/// Data quality threshold: warn if the skipped-candle rate exceeds this fraction.
const SKIP_RATE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    /// Closed trades plus realized slices of open positions, in percent.
    pub realized_pct: f64,
    pub unrealized_pct: f64,
    pub equity_pct: f64,
    pub open_positions: usize,
}

/// Counts of everything the loop declined to act on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipReport {
    pub insane_candles: usize,
    pub non_monotonic_candles: usize,
    pub rejected_signals: usize,
    pub capacity_drops: usize,
    pub signals_seen: usize,
    pub positions_opened: usize,
}

impl SkipReport {
    pub fn skipped_candles(&self) -> usize {
        self.insane_candles + self.non_monotonic_candles
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub trades: Vec<TradeRecord>,
    pub partials: Vec<PartialFill>,
    pub equity: Vec<EquityPoint>,
    pub skips: SkipReport,
    pub candles_processed: usize,
    /// True if the run stopped early on request.
    pub cancelled: bool,
    /// Positions left open (only non-zero when cancelled or `close_at_end` is off).
    pub open_at_end: usize,
    pub data_quality_warnings: Vec<String>,
}

/// Run the simulation over an annotated candle stream.
pub fn run_simulation(
    stream: &[AnnotatedCandle],
    config: &EngineConfig,
) -> Result<SimulationResult, ConfigError> {
    run_simulation_with_cancel(stream, config, &AtomicBool::new(false))
}

/// Like [`run_simulation`], checking `cancel` before every candle.
///
/// A cancelled run returns what it has so far and leaves open positions open.
pub fn run_simulation_with_cancel(
    stream: &[AnnotatedCandle],
    config: &EngineConfig,
    cancel: &AtomicBool,
) -> Result<SimulationResult, ConfigError> {
    config.validate()?;

    let classifier = RegimeClassifier::new(config.classifier.clone());
    let mut engine = LifecycleEngine::new(config.clone());
    let mut ledger = TradeLedger::new();
    let mut skips = SkipReport::default();
    let mut history: Vec<Candle> = Vec::with_capacity(stream.len());
    let mut equity = Vec::with_capacity(stream.len());
    let mut cancelled = false;

    for (index, annotated) in stream.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            info!(index, "simulation cancelled");
            cancelled = true;
            break;
        }

        let candle = &annotated.candle;
        if let Err(rejection) = check_candle(candle, history.last()) {
            warn!(index, time = %candle.time, "skipping candle: {rejection}");
            match rejection {
                CandleRejection::Insane => skips.insane_candles += 1,
                CandleRejection::NonMonotonic { .. } => skips.non_monotonic_candles += 1,
            }
            continue;
        }
        history.push(candle.clone());

        // Phase 1: admission
        if let Some(signal) = annotated.signal.as_ref() {
            match engine.try_open(index, candle, signal, || classifier.classify(&history)) {
                Admission::Opened(_) => {
                    skips.signals_seen += 1;
                    skips.positions_opened += 1;
                }
                Admission::NoSignal => {}
                Admission::Rejected(rejection) => {
                    skips.signals_seen += 1;
                    skips.rejected_signals += 1;
                    warn!(index, time = %candle.time, "signal rejected: {rejection}");
                }
                Admission::AtCapacity => {
                    skips.signals_seen += 1;
                    skips.capacity_drops += 1;
                    debug!(index, open = engine.open_count(), "signal dropped at capacity");
                }
            }
        }

        // Phase 2 + 3: lifecycle and ledger
        let outcome = engine.step(index, candle);
        ledger.record(outcome);

        // Phase 4: equity
        equity.push(mark_equity(&engine, &ledger, candle));
    }

    if !cancelled && config.close_at_end && engine.open_count() > 0 {
        if let Some(last) = history.last() {
            debug!(open = engine.open_count(), "closing positions at end of data");
            let outcome = engine.close_all(last, ExitReason::EndOfData);
            ledger.record(outcome);
            let point = mark_equity(&engine, &ledger, last);
            if let Some(slot) = equity.last_mut() {
                *slot = point;
            }
        }
    }

    let mut data_quality_warnings = Vec::new();
    if !stream.is_empty() {
        let rate = skips.skipped_candles() as f64 / stream.len() as f64;
        if rate > SKIP_RATE_THRESHOLD {
            let msg = format!(
                "{:.1}% of candles skipped exceeds {:.0}% threshold",
                rate * 100.0,
                SKIP_RATE_THRESHOLD * 100.0
            );
            warn!("{msg}");
            data_quality_warnings.push(msg);
        }
    }

    let open_at_end = engine.open_count();
    let (trades, partials) = ledger.into_parts();
    info!(
        candles = history.len(),
        trades = trades.len(),
        skipped = skips.skipped_candles(),
        rejected = skips.rejected_signals,
        dropped = skips.capacity_drops,
        "simulation finished"
    );

    Ok(SimulationResult {
        trades,
        partials,
        equity,
        skips,
        candles_processed: history.len(),
        cancelled,
        open_at_end,
        data_quality_warnings,
    })
}

fn check_candle(candle: &Candle, previous: Option<&Candle>) -> Result<(), CandleRejection> {
    if !candle.is_sane() {
        return Err(CandleRejection::Insane);
    }
    if let Some(prev) = previous {
        if candle.time <= prev.time {
            return Err(CandleRejection::NonMonotonic {
                time: candle.time.to_rfc3339(),
                previous: prev.time.to_rfc3339(),
            });
        }
    }
    Ok(())
}

fn mark_equity(engine: &LifecycleEngine, ledger: &TradeLedger, candle: &Candle) -> EquityPoint {
    let open = engine.open_positions();
    let realized_open: f64 = open.iter().map(|p| p.total_pnl_pct).sum();
    let unrealized: f64 = open.iter().map(|p| p.unrealized_pct(candle.close)).sum();
    let realized = ledger.realized_pnl_pct() + realized_open;
    debug_assert!(realized.is_finite() && unrealized.is_finite(), "equity is not finite");
    EquityPoint {
        time: candle.time,
        realized_pct: realized,
        unrealized_pct: unrealized,
        equity_pct: realized + unrealized,
        open_positions: open.len(),
    }
}
