//! Domain types for RegimeLab

pub mod candle;
pub mod ids;
pub mod signal;
pub mod trade;

pub use candle::Candle;
pub use ids::{ConfigId, DatasetHash, PositionId, RunId};
pub use signal::{AnnotatedCandle, Direction, Regime, Signal, SignalDirection};
pub use trade::{ExitReason, PartialFill, TradeRecord};
