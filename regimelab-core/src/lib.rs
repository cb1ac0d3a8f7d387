//! RegimeLab Core: domain types, regime classifier, cost model, position lifecycle.
//!
//! This crate contains the heart of the simulation engine:
//! - Domain types (candles, signals, trade records, IDs)
//! - Five-heuristic regime classifier (TREND vs RANGE)
//! - Cost model (spread, commission, swap)
//! - Position lifecycle engine with ratchet invariant and ordered exits
//! - Trade ledger and the candle-by-candle simulation loop
//!
//! Nothing here performs I/O. Loading, statistics and export live in
//! `regimelab-runner`.

pub mod config;
pub mod cost;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod indicators;
pub mod ledger;
pub mod regime;

pub use config::{EngineConfig, RegimeParams, MAX_TIMEOUT_HOURS};
pub use cost::{CostModel, FillSide, OffsetMode};
pub use engine::{run_simulation, run_simulation_with_cancel, EquityPoint, SimulationResult};
pub use ledger::TradeLedger;
pub use regime::{ClassifierConfig, RegimeClassifier, RegimeVotes};
