//! Parameter sweeps over independent simulations.
//!
//! Each grid point is a full, isolated run over the same pre-loaded data, so
//! points can be evaluated in parallel with rayon. Results are always
//! returned in grid order, whichever mode is used.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use regimelab_core::EngineConfig;

use crate::data_loader::LoadedData;
use crate::runner::{run_backtest_from_data, BacktestResult, RunError};

/// Axes of a parameter sweep.
///
/// Scales multiply the base value for both regimes. An empty axis keeps the
/// base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub trailing_scale: Vec<f64>,
    pub timeout_scale: Vec<f64>,
    pub max_positions: Vec<usize>,
}

/// One combination of grid values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub trailing_scale: f64,
    pub timeout_scale: f64,
    pub max_positions: usize,
}

impl SweepPoint {
    pub fn apply(&self, base: &EngineConfig) -> EngineConfig {
        let mut config = base.clone();
        config.max_positions = self.max_positions;
        for params in [&mut config.trend, &mut config.range] {
            params.trailing_distance_pct *= self.trailing_scale;
            params.timeout_hours *= self.timeout_scale;
        }
        config
    }
}

impl ParamGrid {
    /// Returns the total number of configurations in this grid.
    pub fn size(&self) -> usize {
        self.trailing_scale.len().max(1)
            * self.timeout_scale.len().max(1)
            * self.max_positions.len().max(1)
    }

    /// All grid points, trailing scale outermost.
    pub fn points(&self, base: &EngineConfig) -> Vec<SweepPoint> {
        let trailing = axis(&self.trailing_scale, 1.0);
        let timeout = axis(&self.timeout_scale, 1.0);
        let positions = axis(&self.max_positions, base.max_positions);

        let mut points = Vec::with_capacity(self.size());
        for &trailing_scale in &trailing {
            for &timeout_scale in &timeout {
                for &max_positions in &positions {
                    points.push(SweepPoint {
                        trailing_scale,
                        timeout_scale,
                        max_positions,
                    });
                }
            }
        }
        points
    }
}

fn axis<T: Copy>(values: &[T], base: T) -> Vec<T> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

/// Parameter sweep executor.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    parallel: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self { parallel: true }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Runs every grid point. Invalid scaled configs fail the whole sweep.
    pub fn sweep(
        &self,
        grid: &ParamGrid,
        base: &EngineConfig,
        data: &LoadedData,
        symbol: &str,
    ) -> Result<SweepResults, RunError> {
        let points = grid.points(base);
        info!(points = points.len(), parallel = self.parallel, "starting sweep");

        let run = |point: &SweepPoint| -> Result<SweepEntry, RunError> {
            let config = point.apply(base);
            let result = run_backtest_from_data(&config, data, symbol)?;
            Ok(SweepEntry {
                point: *point,
                result,
            })
        };

        let entries: Vec<SweepEntry> = if self.parallel {
            points.par_iter().map(run).collect::<Result<Vec<_>, _>>()?
        } else {
            points.iter().map(run).collect::<Result<Vec<_>, _>>()?
        };

        Ok(SweepResults::new(entries))
    }
}

/// Convenience wrapper around [`ParamSweep`].
pub fn run_sweep(
    base: &EngineConfig,
    data: &LoadedData,
    symbol: &str,
    grid: &ParamGrid,
    parallel: bool,
) -> Result<SweepResults, RunError> {
    ParamSweep::new()
        .with_parallelism(parallel)
        .sweep(grid, base, data, symbol)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepEntry {
    pub point: SweepPoint,
    pub result: BacktestResult,
}

/// Results from a parameter sweep, in grid order.
#[derive(Debug)]
pub struct SweepResults {
    entries: Vec<SweepEntry>,
    by_run_id: HashMap<String, usize>,
}

impl SweepResults {
    fn new(entries: Vec<SweepEntry>) -> Self {
        let by_run_id = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.result.run_id.clone(), i))
            .collect();
        Self { entries, by_run_id }
    }

    pub fn all(&self) -> &[SweepEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&SweepEntry> {
        self.by_run_id.get(run_id).map(|&i| &self.entries[i])
    }

    /// Entries sorted by total P&L, descending. Ties keep grid order.
    pub fn sorted_by_pnl(&self) -> Vec<&SweepEntry> {
        let mut sorted: Vec<&SweepEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| {
            b.result
                .statistics
                .total_pnl_pct
                .total_cmp(&a.result.statistics.total_pnl_pct)
        });
        sorted
    }

    pub fn best(&self) -> Option<&SweepEntry> {
        self.sorted_by_pnl().into_iter().next()
    }
}
