//! Backtest runner: wires data, engine, statistics and fingerprints.
//!
//! Entry points:
//! - `run_single_backtest()`: loads data for a `BacktestConfig`, then runs. Used by the CLI.
//! - `run_backtest_from_data()`: takes pre-loaded data and an engine config. Used by sweeps.
//! - `run_backtest_with_cancel()`: same, with a cooperative cancellation flag.

use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use regimelab_core::domain::{ConfigId, DatasetHash, PartialFill, RunId, TradeRecord};
use regimelab_core::engine::SkipReport;
use regimelab_core::fingerprint::{config_id, trades_fingerprint};
use regimelab_core::{run_simulation_with_cancel, EngineConfig, EquityPoint};

use crate::config::{BacktestConfig, ConfigError};
use crate::data_loader::{load_for_config, LoadError, LoadReport, LoadedData};
use crate::statistics::Statistics;

/// Share of unreadable CSV rows above which a data-quality warning is attached.
const ROW_SKIP_RATE_THRESHOLD: f64 = 0.10;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine config error: {0}")]
    Engine(#[from] regimelab_core::error::ConfigError),
    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// BLAKE3 of config id and dataset hash.
    pub run_id: String,
    pub config_id: ConfigId,
    pub dataset_hash: DatasetHash,
    pub symbol: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub has_synthetic: bool,
    pub config: EngineConfig,
    pub statistics: Statistics,
    pub trades: Vec<TradeRecord>,
    pub partials: Vec<PartialFill>,
    pub equity: Vec<EquityPoint>,
    pub skips: SkipReport,
    #[serde(default)]
    pub load_report: LoadReport,
    pub candles_processed: usize,
    pub open_at_end: usize,
    pub cancelled: bool,
    pub trades_fingerprint: String,
    pub data_quality_warnings: Vec<String>,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    /// Short run id prefix used in artifact directory names.
    pub fn short_run_id(&self) -> &str {
        let end = self.run_id.len().min(12);
        &self.run_id[..end]
    }
}

/// Load data for a `BacktestConfig` and run it.
pub fn run_single_backtest(config: &BacktestConfig) -> Result<BacktestResult, RunError> {
    let engine_config = config.to_engine_config()?;
    let loaded = load_for_config(&config.backtest)?;
    run_backtest_from_data(&engine_config, &loaded, &config.backtest.symbol)
}

/// Run a backtest over pre-loaded data. No I/O.
pub fn run_backtest_from_data(
    engine_config: &EngineConfig,
    data: &LoadedData,
    symbol: &str,
) -> Result<BacktestResult, RunError> {
    run_backtest_with_cancel(engine_config, data, symbol, &AtomicBool::new(false))
}

pub fn run_backtest_with_cancel(
    engine_config: &EngineConfig,
    data: &LoadedData,
    symbol: &str,
    cancel: &AtomicBool,
) -> Result<BacktestResult, RunError> {
    let sim = run_simulation_with_cancel(&data.stream, engine_config, cancel)?;

    let config_id = config_id(engine_config)?;
    let run_id = RunId::new(config_id.clone(), data.dataset_hash.clone()).hash();
    let trades_fingerprint = trades_fingerprint(&sim.trades)?;
    let statistics = Statistics::compute(&sim.trades, &sim.equity);

    let mut data_quality_warnings = load_warnings(&data.report);
    data_quality_warnings.extend(sim.data_quality_warnings);
    for w in &data_quality_warnings {
        warn!(symbol, "{w}");
    }

    info!(
        symbol,
        run_id = %&run_id[..run_id.len().min(12)],
        candles = sim.candles_processed,
        trades = statistics.total_trades,
        win_rate = statistics.win_rate,
        total_pnl_pct = statistics.total_pnl_pct,
        max_drawdown_pct = statistics.max_drawdown_pct,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        config_id,
        dataset_hash: data.dataset_hash.clone(),
        symbol: symbol.to_string(),
        start_time: data.stream.first().map(|a| a.candle.time),
        end_time: data.stream.last().map(|a| a.candle.time),
        has_synthetic: data.has_synthetic,
        config: engine_config.clone(),
        statistics,
        trades: sim.trades,
        partials: sim.partials,
        equity: sim.equity,
        skips: sim.skips,
        load_report: data.report.clone(),
        candles_processed: sim.candles_processed,
        open_at_end: sim.open_at_end,
        cancelled: sim.cancelled,
        trades_fingerprint,
        data_quality_warnings,
    })
}

fn load_warnings(report: &LoadReport) -> Vec<String> {
    if report.rows_read == 0 {
        return Vec::new();
    }
    let rate = report.rows_skipped as f64 / report.rows_read as f64;
    if rate > ROW_SKIP_RATE_THRESHOLD {
        vec![format!(
            "{:.1}% of csv rows were unreadable ({} of {})",
            rate * 100.0,
            report.rows_skipped,
            report.rows_read
        )]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::generate_synthetic;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    fn synthetic(n: usize) -> LoadedData {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let stream = generate_synthetic(9, n, start);
        LoadedData {
            dataset_hash: regimelab_core::fingerprint::dataset_hash(&stream),
            report: LoadReport {
                rows_read: n,
                rows_loaded: n,
                ..Default::default()
            },
            stream,
            has_synthetic: true,
        }
    }

    #[test]
    fn result_carries_provenance_and_statistics() {
        let data = synthetic(600);
        let cfg = EngineConfig::default();
        let r = run_backtest_from_data(&cfg, &data, "SYN").unwrap();

        assert_eq!(r.schema_version, SCHEMA_VERSION);
        assert_eq!(r.symbol, "SYN");
        assert!(r.has_synthetic);
        assert_eq!(r.candles_processed, 600);
        assert_eq!(r.equity.len(), 600);
        assert_eq!(r.statistics.total_trades, r.trades.len());
        assert_eq!(r.start_time, Some(data.stream[0].candle.time));
        assert_eq!(r.run_id.len(), 64);
        assert_eq!(r.short_run_id().len(), 12);
        assert_eq!(r.open_at_end, 0);
    }

    #[test]
    fn identical_runs_share_ids_and_fingerprint() {
        let data = synthetic(400);
        let cfg = EngineConfig::default();
        let a = run_backtest_from_data(&cfg, &data, "SYN").unwrap();
        let b = run_backtest_from_data(&cfg, &data, "SYN").unwrap();
        assert_eq!(a, b);

        let other = EngineConfig {
            max_positions: 1,
            ..cfg
        };
        let c = run_backtest_from_data(&other, &data, "SYN").unwrap();
        assert_ne!(a.run_id, c.run_id);
        assert_ne!(a.config_id, c.config_id);
        assert_eq!(a.dataset_hash, c.dataset_hash);
    }

    #[test]
    fn cancelled_run_is_flagged() {
        let data = synthetic(200);
        let cancel = AtomicBool::new(false);
        cancel.store(true, Ordering::SeqCst);
        let r = run_backtest_with_cancel(&EngineConfig::default(), &data, "SYN", &cancel).unwrap();
        assert!(r.cancelled);
        assert_eq!(r.candles_processed, 0);
        assert!(r.trades.is_empty());
    }

    #[test]
    fn invalid_engine_config_is_an_error() {
        let cfg = EngineConfig {
            epsilon: -1.0,
            ..Default::default()
        };
        let err = run_backtest_from_data(&cfg, &synthetic(10), "SYN").unwrap_err();
        assert!(matches!(err, RunError::Engine(_)));
    }

    #[test]
    fn unreadable_rows_produce_warning() {
        let report = LoadReport {
            rows_read: 10,
            rows_loaded: 8,
            rows_skipped: 2,
            signals: 0,
        };
        let warnings = load_warnings(&report);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("20.0%"));
        assert!(load_warnings(&LoadReport::default()).is_empty());
    }
}
