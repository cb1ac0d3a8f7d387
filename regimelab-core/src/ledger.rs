//! Trade ledger: realized partial fills and closed trades in closure order.

use serde::{Deserialize, Serialize};

use crate::domain::{PartialFill, TradeRecord};
use crate::engine::StepOutcome;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeLedger {
    records: Vec<TradeRecord>,
    partials: Vec<PartialFill>,
    closed_pnl_pct: f64,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: StepOutcome) {
        self.partials.extend(outcome.partials);
        for trade in outcome.closed {
            self.push_trade(trade);
        }
    }

    pub fn push_trade(&mut self, trade: TradeRecord) {
        debug_assert!(trade.pnl_pct.is_finite(), "trade {} P&L is not finite", trade.id);
        self.closed_pnl_pct += trade.pnl_pct;
        self.records.push(trade);
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn partials(&self) -> &[PartialFill] {
        &self.partials
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of P&L over fully closed trades, in percent.
    pub fn realized_pnl_pct(&self) -> f64 {
        self.closed_pnl_pct
    }

    pub fn into_parts(self) -> (Vec<TradeRecord>, Vec<PartialFill>) {
        (self.records, self.partials)
    }

    pub fn into_records(self) -> Vec<TradeRecord> {
        self.records
    }
}
