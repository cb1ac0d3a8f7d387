//! TOML backtest configuration.
//!
//! ```toml
//! [backtest]
//! symbol = "EURUSD"
//! candles = "data/eurusd_h1.csv"
//!
//! [engine]
//! max_positions = 3
//!
//! [params.trend]
//! tp_offsets = [1.0, 2.0, 3.5]
//! close_fractions = [0.5, 0.3, 0.2]
//! trailing_distance_pct = 1.0
//! timeout_hours = 72
//!
//! [costs]
//! spread_mode = "points"
//! spread = 1.5
//! point_size = 0.0001
//! ```
//!
//! Every section except `[backtest]` is optional and falls back to the
//! engine defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use regimelab_core::{ClassifierConfig, CostModel, EngineConfig, RegimeParams};

use crate::sweep::ParamGrid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Engine(#[from] regimelab_core::error::ConfigError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestSection {
    pub symbol: String,
    /// CSV path, relative to the config file's directory.
    #[serde(default)]
    pub candles: Option<PathBuf>,
    /// Generate this many synthetic candles instead of reading `candles`.
    #[serde(default)]
    pub synthetic: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSection {
    pub max_positions: usize,
    pub epsilon: f64,
    pub close_at_end: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        let core = EngineConfig::default();
        Self {
            max_positions: core.max_positions,
            epsilon: core.epsilon,
            close_at_end: core.close_at_end,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamsSection {
    #[serde(default = "RegimeParams::trend_default")]
    pub trend: RegimeParams,
    #[serde(default = "RegimeParams::range_default")]
    pub range: RegimeParams,
}

impl Default for ParamsSection {
    fn default() -> Self {
        Self {
            trend: RegimeParams::trend_default(),
            range: RegimeParams::range_default(),
        }
    }
}

/// Serializable configuration for a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub params: ParamsSection,
    #[serde(default)]
    pub costs: CostModel,
    #[serde(default)]
    pub sweep: Option<ParamGrid>,
}

impl BacktestConfig {
    /// Parse and validate a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.to_engine_config()?;
        Ok(config)
    }

    /// Load from a file. A relative `candles` path is resolved against the
    /// config file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        if let (Some(candles), Some(dir)) = (config.backtest.candles.as_ref(), path.parent()) {
            if candles.is_relative() {
                config.backtest.candles = Some(dir.join(candles));
            }
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Assemble and validate the engine configuration.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let config = EngineConfig {
            max_positions: self.engine.max_positions,
            epsilon: self.engine.epsilon,
            close_at_end: self.engine.close_at_end,
            classifier: self.classifier.clone(),
            trend: self.params.trend.clone(),
            range: self.params.range.clone(),
            costs: self.costs.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}
