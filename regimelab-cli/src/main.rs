//! RegimeLab CLI: run, sweep and synthetic-data commands.
//!
//! Commands:
//! - `run`: execute a backtest from a TOML config file
//! - `sweep`: run the config's `[sweep]` grid (or one given on the command line)
//! - `synth`: write a synthetic annotated candle CSV

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use regimelab_runner::data_loader::{candles_to_csv, parse_timestamp};
use regimelab_runner::{
    export_sweep_csv, generate_synthetic, load_for_config, render_summary, run_single_backtest,
    run_sweep, save_artifacts, BacktestConfig, BacktestResult, ParamGrid, SweepResults,
};

#[derive(Parser)]
#[command(
    name = "regimelab",
    about = "RegimeLab CLI: regime-adaptive multi-position backtesting engine"
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the summary only; write no artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,

        /// Print the full result as JSON instead of the text summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run a parameter sweep over the config's base parameters.
    Sweep {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Trailing distance scales (overrides the config's [sweep] grid).
        #[arg(long, value_delimiter = ',')]
        trailing_scale: Vec<f64>,

        /// Timeout scales.
        #[arg(long, value_delimiter = ',')]
        timeout_scale: Vec<f64>,

        /// Max concurrent positions.
        #[arg(long, value_delimiter = ',')]
        max_positions: Vec<usize>,

        /// Run grid points one at a time.
        #[arg(long, default_value_t = false)]
        serial: bool,

        /// Write the sweep table to this CSV file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write a synthetic annotated candle CSV.
    Synth {
        /// Number of hourly candles.
        #[arg(long, default_value_t = 5000)]
        candles: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// First candle time (RFC 3339 or unix seconds).
        #[arg(long, default_value = "2024-01-01T00:00:00Z")]
        start: String,

        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            no_save,
            json,
        } => run_backtest_cmd(&config, &output_dir, no_save, json),
        Commands::Sweep {
            config,
            trailing_scale,
            timeout_scale,
            max_positions,
            serial,
            output,
        } => {
            let cli_grid = ParamGrid {
                trailing_scale,
                timeout_scale,
                max_positions,
            };
            run_sweep_cmd(&config, cli_grid, !serial, output.as_deref())
        }
        Commands::Synth {
            candles,
            seed,
            start,
            output,
        } => run_synth_cmd(candles, seed, &start, &output),
    }
}

/// `RUST_LOG` wins over `--log-level`.
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))
}

fn run_backtest_cmd(
    config_path: &Path,
    output_dir: &Path,
    no_save: bool,
    json: bool,
) -> Result<()> {
    let config = BacktestConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let result = run_single_backtest(&config)?;

    if json {
        println!("{}", regimelab_runner::export_json(&result)?);
    } else {
        print_summary(&result);
    }

    if !no_save {
        let run_dir = save_artifacts(&result, output_dir)?;
        info!(dir = %run_dir.display(), "artifacts saved");
        if !json {
            println!("Artifacts saved to: {}", run_dir.display());
        }
    }
    Ok(())
}

fn run_sweep_cmd(
    config_path: &Path,
    cli_grid: ParamGrid,
    parallel: bool,
    output: Option<&Path>,
) -> Result<()> {
    let config = BacktestConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let grid = if cli_grid != ParamGrid::default() {
        cli_grid
    } else if let Some(grid) = config.sweep.clone() {
        grid
    } else {
        bail!("no sweep grid: add a [sweep] section or pass --trailing-scale/--timeout-scale/--max-positions");
    };

    let base = config.to_engine_config()?;
    let data = load_for_config(&config.backtest)?;
    let results = run_sweep(&base, &data, &config.backtest.symbol, &grid, parallel)?;

    print_sweep_table(&results);

    if let Some(path) = output {
        let csv = export_sweep_csv(&results)?;
        std::fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))?;
        println!("Sweep table saved to: {}", path.display());
    }
    Ok(())
}

fn run_synth_cmd(candles: usize, seed: u64, start: &str, output: &Path) -> Result<()> {
    if candles == 0 {
        bail!("--candles must be at least 1");
    }
    let start: DateTime<Utc> =
        parse_timestamp(start).with_context(|| format!("invalid --start '{start}'"))?;
    let stream = generate_synthetic(seed, candles, start);
    let file = std::fs::File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    candles_to_csv(&stream, file)?;
    let signals = stream.iter().filter(|a| a.signal.is_some()).count();
    println!(
        "Wrote {} candles ({} signals) to {}",
        stream.len(),
        signals,
        output.display()
    );
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    println!();
    println!("=== Backtest Result ===");
    print!("{}", render_summary(result));
    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}

fn print_sweep_table(results: &SweepResults) {
    println!();
    println!(
        "{:>8} {:>8} {:>5} {:>7} {:>8} {:>7} {:>10} {:>9}",
        "trail", "timeout", "max", "trades", "win%", "pf", "pnl%", "maxdd%"
    );
    for entry in results.all() {
        let s = &entry.result.statistics;
        println!(
            "{:>8.2} {:>8.2} {:>5} {:>7} {:>8.1} {:>7.2} {:>10.3} {:>9.3}",
            entry.point.trailing_scale,
            entry.point.timeout_scale,
            entry.point.max_positions,
            s.total_trades,
            s.win_rate * 100.0,
            s.profit_factor,
            s.total_pnl_pct,
            s.max_drawdown_pct
        );
    }
    if let Some(best) = results.best() {
        println!();
        println!(
            "Best: trailing x{} timeout x{} max_positions {} (run {})",
            best.point.trailing_scale,
            best.point.timeout_scale,
            best.point.max_positions,
            best.result.short_run_id()
        );
    }
    println!();
}
