//! RegimeLab Runner: backtest orchestration on top of `regimelab-core`.
//!
//! - TOML configuration
//! - CSV candle loading with synthetic fallback
//! - Single-backtest runner with statistics and fingerprints
//! - Parallel parameter sweeps
//! - JSON/CSV/Markdown export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;
pub mod statistics;
pub mod sweep;

pub use config::{BacktestConfig, ConfigError};
pub use data_loader::{
    generate_synthetic, load_candles_csv, load_for_config, LoadError, LoadReport, LoadedData,
};
pub use export::{
    export_equity_csv, export_json, export_partials_csv, export_sweep_csv, export_trades_csv,
    generate_report, import_json, load_artifacts, render_summary, save_artifacts,
};
pub use runner::{
    run_backtest_from_data, run_backtest_with_cancel, run_single_backtest, BacktestResult,
    RunError, SCHEMA_VERSION,
};
pub use statistics::{GroupStats, Statistics};
pub use sweep::{run_sweep, ParamGrid, ParamSweep, SweepEntry, SweepPoint, SweepResults};
