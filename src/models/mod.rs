//! Data models for strategies, predictions, positions, trades, and metrics.

mod metrics;
mod position;
mod prediction;
mod strategy;
mod trade;

pub use metrics::SessionMetrics;
pub use position::{ClosedPosition, OpenPosition, Position};
pub use prediction::{Direction, Prediction};
pub use strategy::Strategy;
pub use trade::{TradeAction, TradeRecord, TradeSide};
