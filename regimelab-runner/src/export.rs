//! Reporting and export: JSON, CSV, text and Markdown artifacts.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: trade ledger, partial fills, equity samples and sweep tables
//! - **Text/Markdown**: human-readable run summaries
//!
//! Floats in CSV use shortest round-trip formatting, so every value parses
//! back to the identical `f64`. Times are RFC 3339 in UTC.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use regimelab_core::domain::{PartialFill, TradeRecord};
use regimelab_core::EquityPoint;

use crate::runner::{BacktestResult, SCHEMA_VERSION};
use crate::statistics::GroupStats;
use crate::sweep::SweepResults;

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

pub const TRADE_COLUMNS: [&str; 18] = [
    "id",
    "direction",
    "regime",
    "entry_time",
    "entry_price",
    "initial_sl",
    "exit_time",
    "exit_price",
    "final_sl",
    "exit_reason",
    "tp1_hit",
    "tp2_hit",
    "tp3_hit",
    "trailing_used",
    "pnl_pct",
    "swap_pct",
    "duration_secs",
    "partial_count",
];

/// One row per closed position, every `TradeRecord` field.
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(TRADE_COLUMNS)?;
    for t in trades {
        wtr.write_record([
            t.id.0.to_string(),
            t.direction.to_string(),
            t.regime.to_string(),
            t.entry_time.to_rfc3339(),
            t.entry_price.to_string(),
            t.initial_sl.to_string(),
            t.exit_time.to_rfc3339(),
            t.exit_price.to_string(),
            t.final_sl.to_string(),
            t.exit_reason.to_string(),
            t.tp1_hit.to_string(),
            t.tp2_hit.to_string(),
            t.tp3_hit.to_string(),
            t.trailing_used.to_string(),
            t.pnl_pct.to_string(),
            t.swap_pct.to_string(),
            t.duration_secs.to_string(),
            t.partial_count.to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn export_partials_csv(partials: &[PartialFill]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["position_id", "time", "reason", "fraction", "price", "pnl_pct"])?;
    for p in partials {
        wtr.write_record([
            p.position_id.0.to_string(),
            p.time.to_rfc3339(),
            p.reason.to_string(),
            p.fraction.to_string(),
            p.price.to_string(),
            p.pnl_pct.to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn export_equity_csv(equity: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "time",
        "realized_pct",
        "unrealized_pct",
        "equity_pct",
        "open_positions",
    ])?;
    for e in equity {
        wtr.write_record([
            e.time.to_rfc3339(),
            e.realized_pct.to_string(),
            e.unrealized_pct.to_string(),
            e.equity_pct.to_string(),
            e.open_positions.to_string(),
        ])?;
    }
    finish(wtr)
}

/// One row per sweep point, in grid order.
pub fn export_sweep_csv(results: &SweepResults) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "trailing_scale",
        "timeout_scale",
        "max_positions",
        "run_id",
        "trades",
        "win_rate",
        "profit_factor",
        "total_pnl_pct",
        "max_drawdown_pct",
    ])?;
    for entry in results.all() {
        let s = &entry.result.statistics;
        wtr.write_record([
            entry.point.trailing_scale.to_string(),
            entry.point.timeout_scale.to_string(),
            entry.point.max_positions.to_string(),
            entry.result.run_id.clone(),
            s.total_trades.to_string(),
            s.win_rate.to_string(),
            s.profit_factor.to_string(),
            s.total_pnl_pct.to_string(),
            s.max_drawdown_pct.to_string(),
        ])?;
    }
    finish(wtr)
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates `{symbol}_{run id prefix}/` under `output_dir` containing
/// `result.json`, `trades.csv`, `partials.csv`, `equity.csv` and `report.md`.
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(format!("{}_{}", result.symbol, result.short_run_id()));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("result.json", export_json(result)?),
        ("trades.csv", export_trades_csv(&result.trades)?),
        ("partials.csv", export_partials_csv(&result.partials)?),
        ("equity.csv", export_equity_csv(&result.equity)?),
        ("report.md", generate_report(result)),
    ];
    for (name, contents) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's `result.json`.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

// ─── Text summary ───────────────────────────────────────────────────

/// Plain-text summary for terminal output.
pub fn render_summary(result: &BacktestResult) -> String {
    let s = &result.statistics;
    let mut out = String::with_capacity(1024);

    out.push_str(&format!(
        "{} | run {} | {} candles",
        result.symbol,
        result.short_run_id(),
        result.candles_processed
    ));
    if result.has_synthetic {
        out.push_str(" | SYNTHETIC");
    }
    if result.cancelled {
        out.push_str(" | CANCELLED");
    }
    out.push('\n');

    out.push_str(&format!(
        "Trades: {}  Wins: {}  Losses: {}  Win rate: {:.1}%\n",
        s.total_trades,
        s.wins,
        s.losses,
        s.win_rate * 100.0
    ));
    out.push_str(&format!(
        "Total P&L: {:.3}%  Profit factor: {:.2}  Expectancy: {:.3}%\n",
        s.total_pnl_pct, s.profit_factor, s.expectancy_pct
    ));
    out.push_str(&format!(
        "Max drawdown: {:.3}%  Avg win: {:.3}%  Avg loss: {:.3}%\n",
        s.max_drawdown_pct, s.avg_win_pct, s.avg_loss_pct
    ));
    out.push_str(&format!(
        "Signals: {}  Opened: {}  Rejected: {}  Dropped at capacity: {}\n",
        result.skips.signals_seen,
        result.skips.positions_opened,
        result.skips.rejected_signals,
        result.skips.capacity_drops
    ));

    if !s.exit_reasons.is_empty() {
        let reasons: Vec<String> = s
            .exit_reasons
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        out.push_str(&format!("Exits: {}\n", reasons.join(" ")));
    }
    if result.open_at_end > 0 {
        out.push_str(&format!("Open at end: {}\n", result.open_at_end));
    }
    for w in &result.data_quality_warnings {
        out.push_str(&format!("WARNING: {w}\n"));
    }
    out
}

// ─── Markdown reports ───────────────────────────────────────────────

/// Generate a Markdown report for a single backtest run.
pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(4096);
    let s = &result.statistics;

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Symbol | {} |\n", result.symbol));
    let period = match (result.start_time, result.end_time) {
        (Some(a), Some(b)) => format!("{} to {}", a.to_rfc3339(), b.to_rfc3339()),
        _ => "empty".to_string(),
    };
    md.push_str(&format!("| Period | {period} |\n"));
    md.push_str(&format!("| Candles | {} |\n", result.candles_processed));
    md.push_str(&format!("| Run ID | {} |\n", result.run_id));
    md.push_str(&format!("| Dataset Hash | {} |\n", result.dataset_hash));
    md.push_str(&format!("| Trades Fingerprint | {} |\n", result.trades_fingerprint));
    md.push_str(&format!("| Max Positions | {} |\n", result.config.max_positions));
    if result.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Trades | {} |\n", s.total_trades));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", s.win_rate * 100.0));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", s.profit_factor));
    md.push_str(&format!("| Total P&L | {:.3}% |\n", s.total_pnl_pct));
    md.push_str(&format!("| Expectancy | {:.3}% |\n", s.expectancy_pct));
    md.push_str(&format!("| Avg Win | {:.3}% |\n", s.avg_win_pct));
    md.push_str(&format!("| Avg Loss | {:.3}% |\n", s.avg_loss_pct));
    md.push_str(&format!("| Max Drawdown | {:.3}% |\n", s.max_drawdown_pct));
    md.push_str(&format!("| Swap | {:.3}% |\n", s.total_swap_pct));
    md.push_str(&format!("| Max Consecutive Wins | {} |\n", s.max_consecutive_wins));
    md.push_str(&format!(
        "| Max Consecutive Losses | {} |\n",
        s.max_consecutive_losses
    ));
    md.push_str(&format!("| Avg Duration | {:.1}h |\n", s.avg_duration_hours));
    md.push_str(&format!(
        "| Trailing Used | {:.1}% |\n",
        s.trailing_usage_rate * 100.0
    ));
    md.push('\n');

    if !s.exit_reasons.is_empty() {
        md.push_str("## Exit Reasons\n\n");
        md.push_str("| Reason | Count |\n");
        md.push_str("| --- | --- |\n");
        for (reason, count) in &s.exit_reasons {
            md.push_str(&format!("| {reason} | {count} |\n"));
        }
        md.push('\n');
    }

    push_group_table(&mut md, "By Regime", "Regime", &s.by_regime);
    push_group_table(&mut md, "By Direction", "Direction", &s.by_direction);
    push_group_table(&mut md, "Monthly", "Month", &s.monthly);

    if !result.data_quality_warnings.is_empty() {
        md.push_str("## Data Quality\n\n");
        for warn in &result.data_quality_warnings {
            md.push_str(&format!("- {warn}\n"));
        }
        md.push('\n');
    }

    md
}

fn push_group_table(
    md: &mut String,
    title: &str,
    key: &str,
    groups: &BTreeMap<String, GroupStats>,
) {
    if groups.is_empty() {
        return;
    }
    md.push_str(&format!("## {title}\n\n"));
    md.push_str(&format!(
        "| {key} | Trades | Win Rate | Total P&L | Avg P&L | Profit Factor |\n"
    ));
    md.push_str("| --- | --- | --- | --- | --- | --- |\n");
    for (name, g) in groups {
        md.push_str(&format!(
            "| {name} | {} | {:.1}% | {:.3}% | {:.3}% | {:.2} |\n",
            g.trades,
            g.win_rate * 100.0,
            g.total_pnl_pct,
            g.avg_pnl_pct,
            g.profit_factor
        ));
    }
    md.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::{generate_synthetic, LoadReport, LoadedData};
    use crate::runner::run_backtest_from_data;
    use chrono::{DateTime, TimeZone, Utc};
    use regimelab_core::domain::ExitReason;
    use regimelab_core::EngineConfig;

    fn sample_result() -> BacktestResult {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stream = generate_synthetic(5, 1500, start);
        let data = LoadedData {
            dataset_hash: regimelab_core::fingerprint::dataset_hash(&stream),
            report: LoadReport::default(),
            stream,
            has_synthetic: true,
        };
        run_backtest_from_data(&EngineConfig::default(), &data, "SYN").unwrap()
    }

    #[test]
    fn json_roundtrip() {
        let result = sample_result();
        let json = export_json(&result).unwrap();
        let back = import_json(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn json_rejects_unknown_version() {
        let mut result = sample_result();
        result.schema_version = SCHEMA_VERSION + 1;
        let json = serde_json::to_string(&result).unwrap();
        let err = import_json(&json).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version"));
    }

    #[test]
    fn trades_csv_has_every_field_without_precision_loss() {
        let result = sample_result();
        assert!(!result.trades.is_empty());
        let csv = export_trades_csv(&result.trades).unwrap();

        let mut rdr = csv::Reader::from_reader(csv.as_bytes());
        let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, TRADE_COLUMNS);

        for (row, trade) in rdr.records().zip(&result.trades) {
            let row = row.unwrap();
            assert_eq!(row[0].parse::<u64>().unwrap(), trade.id.0);
            let entry: DateTime<Utc> = row[3].parse().unwrap();
            assert_eq!(entry, trade.entry_time);
            assert_eq!(row[4].parse::<f64>().unwrap(), trade.entry_price);
            assert_eq!(row[7].parse::<f64>().unwrap(), trade.exit_price);
            assert_eq!(row[8].parse::<f64>().unwrap(), trade.final_sl);
            assert_eq!(ExitReason::parse(&row[9]), Some(trade.exit_reason));
            assert_eq!(row[14].parse::<f64>().unwrap(), trade.pnl_pct);
            assert_eq!(row[16].parse::<i64>().unwrap(), trade.duration_secs);
        }
    }

    #[test]
    fn partials_and_equity_csv_row_counts() {
        let result = sample_result();
        let partials = export_partials_csv(&result.partials).unwrap();
        assert_eq!(partials.lines().count(), result.partials.len() + 1);
        let equity = export_equity_csv(&result.equity).unwrap();
        assert_eq!(equity.lines().count(), result.equity.len() + 1);
        assert!(equity.starts_with("time,realized_pct,unrealized_pct,equity_pct,open_positions"));
    }

    #[test]
    fn csv_empty_trades() {
        let csv = export_trades_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn markdown_report_has_sections() {
        let md = generate_report(&sample_result());
        assert!(md.contains("# Backtest Report"));
        assert!(md.contains("## Performance Summary"));
        assert!(md.contains("## Exit Reasons"));
        assert!(md.contains("## By Regime"));
        assert!(md.contains("## Monthly"));
        assert!(md.contains("| 2024-01 |"));
        assert!(md.contains("**SYNTHETIC**"));
    }

    #[test]
    fn summary_mentions_core_numbers() {
        let result = sample_result();
        let text = render_summary(&result);
        assert!(text.starts_with("SYN | run "));
        assert!(text.contains(&format!("Trades: {}", result.statistics.total_trades)));
        assert!(text.contains("Max drawdown"));
    }

    #[test]
    fn save_load_artifacts_roundtrip() {
        let result = sample_result();
        let dir = tempfile::tempdir().unwrap();
        let run_dir = save_artifacts(&result, dir.path()).unwrap();

        for name in ["result.json", "trades.csv", "partials.csv", "equity.csv", "report.md"] {
            assert!(run_dir.join(name).exists(), "missing {name}");
        }
        assert!(run_dir.ends_with(format!("SYN_{}", result.short_run_id())));

        let loaded = load_artifacts(&run_dir).unwrap();
        assert_eq!(loaded, result);
    }
}
