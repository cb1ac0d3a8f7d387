//! End-to-end: TOML config → CSV load → backtest → artifacts, and sweeps.

use std::path::Path;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use regimelab_core::domain::{Direction, ExitReason};
use regimelab_runner::data_loader::candles_to_csv;
use regimelab_runner::statistics::max_drawdown;
use regimelab_runner::{
    export_sweep_csv, generate_synthetic, load_artifacts, load_candles_csv, run_single_backtest,
    run_sweep, save_artifacts, BacktestConfig, ParamGrid, RunError,
};

// ── Helpers ──────────────────────────────────────────────────────────

const TRAILING_SCENARIO: &str = "\
timestamp,open,high,low,close,signal,stop_loss
2024-02-01T00:00:00Z,99.8,100.2,99.6,100,long,98
2024-02-01T01:00:00Z,100,103,99.5,102.5,,
2024-02-01T02:00:00Z,103.7,105,103.6,104.5,,
2024-02-01T03:00:00Z,104.5,104.8,103.3,103.5,,
";

const SCENARIO_CONFIG: &str = r#"
[backtest]
symbol = "TEST"
candles = "candles.csv"

[engine]
max_positions = 1

[params.trend]
tp_offsets = [2.0, 4.0, 7.0]
close_fractions = [0.5, 0.3, 0.2]
trailing_distance_pct = 1.5
timeout_hours = 1000

[params.range]
tp_offsets = [2.0, 4.0, 7.0]
close_fractions = [0.5, 0.3, 0.2]
trailing_distance_pct = 1.5
timeout_hours = 1000
"#;

fn write_scenario(dir: &Path) -> std::path::PathBuf {
    std::fs::write(dir.join("candles.csv"), TRAILING_SCENARIO).unwrap();
    let path = dir.join("backtest.toml");
    std::fs::write(&path, SCENARIO_CONFIG).unwrap();
    path
}

// ── Single run ───────────────────────────────────────────────────────

#[test]
fn toml_and_csv_drive_the_trailing_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let config = BacktestConfig::from_file(&write_scenario(dir.path())).unwrap();
    let result = run_single_backtest(&config).unwrap();

    assert!(!result.has_synthetic);
    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.direction, Direction::Long);
    assert_eq!(trade.exit_reason, ExitReason::TrailingSl);
    assert!((trade.pnl_pct - 2.885).abs() < 1e-9);
    assert_eq!(result.partials.len(), 3);
    assert_eq!(result.statistics.total_trades, 1);
    assert_eq!(result.statistics.exit_reasons["TRAILING_SL"], 1);
    assert!((result.statistics.win_rate - 1.0).abs() < 1e-12);
}

#[test]
fn artifacts_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = BacktestConfig::from_file(&write_scenario(dir.path())).unwrap();
    let result = run_single_backtest(&config).unwrap();

    let out = dir.path().join("results");
    let run_dir = save_artifacts(&result, &out).unwrap();
    let loaded = load_artifacts(&run_dir).unwrap();
    assert_eq!(loaded, result);

    let trades = std::fs::read_to_string(run_dir.join("trades.csv")).unwrap();
    assert_eq!(trades.lines().count(), 2);
    assert!(trades.contains("TRAILING_SL"));
    let report = std::fs::read_to_string(run_dir.join("report.md")).unwrap();
    assert!(report.contains("| 2024-02 |"));
}

#[test]
fn missing_candles_file_is_a_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bt.toml");
    std::fs::write(&path, "[backtest]\nsymbol = \"X\"\ncandles = \"missing.csv\"\n").unwrap();
    let config = BacktestConfig::from_file(&path).unwrap();
    assert!(matches!(
        run_single_backtest(&config),
        Err(RunError::Data(_))
    ));
}

#[test]
fn synthetic_csv_round_trip_gives_same_run() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let stream = generate_synthetic(21, 800, start);
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("synth.csv");
    let file = std::fs::File::create(&csv_path).unwrap();
    candles_to_csv(&stream, file).unwrap();

    let loaded = load_candles_csv(&csv_path).unwrap();
    assert_eq!(loaded.stream, stream);
    assert_eq!(
        loaded.dataset_hash,
        regimelab_core::fingerprint::dataset_hash(&stream)
    );
}

// ── Sweeps ───────────────────────────────────────────────────────────

#[test]
fn serial_and_parallel_sweeps_are_identical() {
    let config = BacktestConfig::from_toml(
        "[backtest]\nsymbol = \"SYN\"\nsynthetic = 1200\nseed = 7\n",
    )
    .unwrap();
    let base = config.to_engine_config().unwrap();
    let data = regimelab_runner::load_for_config(&config.backtest).unwrap();
    let grid = ParamGrid {
        trailing_scale: vec![0.5, 1.0, 2.0],
        timeout_scale: vec![0.5, 1.0],
        max_positions: vec![1, 3],
    };

    let serial = run_sweep(&base, &data, "SYN", &grid, false).unwrap();
    let parallel = run_sweep(&base, &data, "SYN", &grid, true).unwrap();

    assert_eq!(serial.len(), 12);
    assert_eq!(serial.all(), parallel.all());

    for entry in serial.all() {
        assert_eq!(parallel.get(&entry.result.run_id), Some(entry));
    }

    let csv = export_sweep_csv(&parallel).unwrap();
    assert_eq!(csv.lines().count(), 13);

    let best = serial.best().unwrap();
    assert!(serial
        .all()
        .iter()
        .all(|e| e.result.statistics.total_pnl_pct <= best.result.statistics.total_pnl_pct));
}

#[test]
fn sweep_with_invalid_scale_fails() {
    let config =
        BacktestConfig::from_toml("[backtest]\nsymbol = \"SYN\"\nsynthetic = 50\n").unwrap();
    let base = config.to_engine_config().unwrap();
    let data = regimelab_runner::load_for_config(&config.backtest).unwrap();
    let grid = ParamGrid {
        trailing_scale: vec![0.0],
        ..Default::default()
    };
    assert!(matches!(
        run_sweep(&base, &data, "SYN", &grid, true),
        Err(RunError::Engine(_))
    ));
}

#[test]
fn sweep_scaling_timeout_past_the_bound_fails() {
    let config =
        BacktestConfig::from_toml("[backtest]\nsymbol = \"SYN\"\nsynthetic = 300\n").unwrap();
    let base = config.to_engine_config().unwrap();
    let data = regimelab_runner::load_for_config(&config.backtest).unwrap();
    let grid = ParamGrid {
        timeout_scale: vec![1e12],
        ..Default::default()
    };
    assert!(matches!(
        run_sweep(&base, &data, "SYN", &grid, false),
        Err(RunError::Engine(_))
    ));
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn drawdown_is_non_negative_and_bounded(curve in prop::collection::vec(-50.0..50.0_f64, 0..200)) {
        let dd = max_drawdown(&curve);
        prop_assert!(dd >= 0.0);
        let hi = curve.iter().cloned().fold(0.0_f64, f64::max);
        let lo = curve.iter().cloned().fold(0.0_f64, f64::min);
        prop_assert!(dd <= hi - lo + 1e-9);
    }
}
