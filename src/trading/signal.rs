//! Signal interpretation: maps a strategy's prediction to a trading action.

use serde::{Deserialize, Serialize};

use crate::models::{Direction, Prediction, Strategy, TradeSide};

/// Discrete trading action derived from a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    None,
}

impl Signal {
    /// Side to trade, or `None` when there is nothing actionable.
    pub fn side(&self) -> Option<TradeSide> {
        match self {
            Signal::Buy => Some(TradeSide::Buy),
            Signal::Sell => Some(TradeSide::Sell),
            Signal::None => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::None => "none",
        })
    }
}

/// Interpret a prediction for the active strategy.
///
/// Predictions scoped to another strategy carry no signal for this one.
pub fn interpret(strategy: Strategy, prediction: &Prediction) -> Signal {
    if prediction.strategy != strategy {
        return Signal::None;
    }

    match prediction.direction {
        Direction::Up => Signal::Buy,
        Direction::Down => Signal::Sell,
        Direction::Neutral | Direction::Unrecognized => Signal::None,
    }
}
