//! Statistics aggregator: summary metrics over a closed-trade ledger.
//!
//! Every metric is a pure function of the trade list and/or the equity
//! samples. P&L values are percentages of entry price, so the equity curve
//! is additive (percentage points) rather than compounding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use regimelab_core::domain::TradeRecord;
use regimelab_core::EquityPoint;

/// Cap for profit factor when there are no losing trades.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Per-group breakdown (regime, direction or month).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_pnl_pct: f64,
    pub avg_pnl_pct: f64,
    pub profit_factor: f64,
}

impl GroupStats {
    pub fn compute(trades: &[&TradeRecord]) -> Self {
        let n = trades.len();
        let wins = trades.iter().filter(|t| t.is_winner()).count();
        let losses = trades.iter().filter(|t| is_loser(t)).count();
        let pnls: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
        let total: f64 = pnls.iter().sum();
        Self {
            trades: n,
            wins,
            losses,
            win_rate: ratio(wins as f64, n as f64),
            total_pnl_pct: total,
            avg_pnl_pct: ratio(total, n as f64),
            profit_factor: profit_factor_of(&pnls),
        }
    }
}

/// Aggregate statistics for one backtest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub gross_profit_pct: f64,
    pub gross_loss_pct: f64,
    pub profit_factor: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub expectancy_pct: f64,
    pub total_pnl_pct: f64,
    pub total_swap_pct: f64,
    /// Largest peak-to-trough fall of equity, in percentage points (>= 0).
    pub max_drawdown_pct: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub avg_duration_hours: f64,
    pub trailing_usage_rate: f64,
    pub exit_reasons: BTreeMap<String, usize>,
    pub by_regime: BTreeMap<String, GroupStats>,
    pub by_direction: BTreeMap<String, GroupStats>,
    /// Keyed by exit month, `YYYY-MM`.
    pub monthly: BTreeMap<String, GroupStats>,
}

impl Statistics {
    /// Compute all statistics. With no equity samples, drawdown is taken
    /// from the cumulative closed-trade P&L in exit order.
    pub fn compute(trades: &[TradeRecord], equity: &[EquityPoint]) -> Self {
        let max_drawdown_pct = if equity.is_empty() {
            max_drawdown(&closed_equity_curve(trades))
        } else {
            let curve: Vec<f64> = equity.iter().map(|p| p.equity_pct).collect();
            max_drawdown(&curve)
        };

        let n = trades.len();
        let wins = trades.iter().filter(|t| t.is_winner()).count();
        let losses = trades.iter().filter(|t| is_loser(t)).count();
        let trailing = trades.iter().filter(|t| t.trailing_used).count();
        let total_hours: f64 = trades.iter().map(|t| t.duration_hours()).sum();

        Self {
            total_trades: n,
            wins,
            losses,
            win_rate: win_rate(trades),
            gross_profit_pct: gross_profit(trades),
            gross_loss_pct: gross_loss(trades),
            profit_factor: profit_factor(trades),
            avg_win_pct: avg_win(trades),
            avg_loss_pct: avg_loss(trades),
            expectancy_pct: expectancy(trades),
            total_pnl_pct: trades.iter().map(|t| t.pnl_pct).sum(),
            total_swap_pct: trades.iter().map(|t| t.swap_pct).sum(),
            max_drawdown_pct,
            max_consecutive_wins: max_consecutive(trades, |t| t.is_winner()),
            max_consecutive_losses: max_consecutive(trades, is_loser),
            avg_duration_hours: ratio(total_hours, n as f64),
            trailing_usage_rate: ratio(trailing as f64, n as f64),
            exit_reasons: exit_reason_counts(trades),
            by_regime: group_by(trades, |t| t.regime.to_string()),
            by_direction: group_by(trades, |t| t.direction.to_string()),
            monthly: group_by(trades, |t| t.exit_time.format("%Y-%m").to_string()),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    ratio(winners as f64, trades.len() as f64)
}

pub fn gross_profit(trades: &[TradeRecord]) -> f64 {
    trades.iter().map(|t| t.pnl_pct).filter(|&p| p > 0.0).sum()
}

/// Sum of losing P&L as a positive number.
pub fn gross_loss(trades: &[TradeRecord]) -> f64 {
    trades
        .iter()
        .map(|t| t.pnl_pct)
        .filter(|&p| p < 0.0)
        .map(f64::abs)
        .sum()
}

/// Gross profit / gross loss, capped at [`PROFIT_FACTOR_CAP`].
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
    profit_factor_of(&pnls)
}

pub fn avg_win(trades: &[TradeRecord]) -> f64 {
    let wins: Vec<f64> = trades.iter().map(|t| t.pnl_pct).filter(|&p| p > 0.0).collect();
    mean_f64(&wins)
}

/// Mean losing P&L (negative or zero).
pub fn avg_loss(trades: &[TradeRecord]) -> f64 {
    let losses: Vec<f64> = trades.iter().map(|t| t.pnl_pct).filter(|&p| p < 0.0).collect();
    mean_f64(&losses)
}

/// Expected P&L per trade: `win_rate * avg_win + loss_rate * avg_loss`.
pub fn expectancy(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wr = win_rate(trades);
    let losers = trades.iter().filter(|t| t.pnl_pct < 0.0).count();
    let lr = losers as f64 / trades.len() as f64;
    wr * avg_win(trades) + lr * avg_loss(trades)
}

/// Maximum drawdown of an additive equity curve, in the curve's units.
///
/// The peak starts at zero (flat equity before the first sample).
pub fn max_drawdown(curve: &[f64]) -> f64 {
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for &eq in curve {
        if !eq.is_finite() {
            continue;
        }
        peak = peak.max(eq);
        max_dd = max_dd.max(peak - eq);
    }
    max_dd
}

/// Cumulative closed P&L after each trade, ordered by exit time.
pub fn closed_equity_curve(trades: &[TradeRecord]) -> Vec<f64> {
    let mut ordered: Vec<&TradeRecord> = trades.iter().collect();
    ordered.sort_by_key(|t| (t.exit_time, t.id));
    let mut total = 0.0;
    ordered
        .iter()
        .map(|t| {
            total += t.pnl_pct;
            total
        })
        .collect()
}

pub fn exit_reason_counts(trades: &[TradeRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for trade in trades {
        *counts.entry(trade.exit_reason.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

// ─── Helpers ────────────────────────────────────────────────────────

fn group_by<F>(trades: &[TradeRecord], key: F) -> BTreeMap<String, GroupStats>
where
    F: Fn(&TradeRecord) -> String,
{
    let mut groups: BTreeMap<String, Vec<&TradeRecord>> = BTreeMap::new();
    for trade in trades {
        groups.entry(key(trade)).or_default().push(trade);
    }
    groups
        .into_iter()
        .map(|(k, members)| (k, GroupStats::compute(&members)))
        .collect()
}

fn profit_factor_of(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    let profit: f64 = pnls.iter().filter(|&&p| p > 0.0).sum();
    let loss: f64 = pnls.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();
    if loss < 1e-10 {
        return if profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    (profit / loss).min(PROFIT_FACTOR_CAP)
}

/// Strictly negative P&L. Break-even trades are neither wins nor losses.
fn is_loser(trade: &TradeRecord) -> bool {
    trade.pnl_pct < 0.0
}

/// Longest run of consecutive trades matching `pred`. A break-even trade
/// ends both win and loss streaks.
fn max_consecutive(trades: &[TradeRecord], pred: impl Fn(&TradeRecord) -> bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for trade in trades {
        if pred(trade) {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

fn mean_f64(values: &[f64]) -> f64 {
    ratio(values.iter().sum(), values.len() as f64)
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
