//! Structured predictions parsed once at the service boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Strategy;

/// Market direction carried by a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Neutral,
    Unrecognized,
}

/// Latest output of a strategy's prediction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Strategy whose endpoint produced this prediction
    pub strategy: Strategy,

    /// Direction matched against the strategy's phrases
    pub direction: Direction,

    /// Raw text as returned by the service
    pub raw: String,

    /// When the prediction was received
    pub received_at: DateTime<Utc>,
}

impl Prediction {
    /// Parse raw prediction text for a strategy. Matching is exact and
    /// case-sensitive; anything else is `Unrecognized`.
    pub fn parse(strategy: Strategy, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let phrases = strategy.phrases();

        let direction = if raw == phrases.up {
            Direction::Up
        } else if raw == phrases.down {
            Direction::Down
        } else if phrases.neutral == Some(raw.as_str()) {
            Direction::Neutral
        } else {
            Direction::Unrecognized
        };

        Self {
            strategy,
            direction,
            raw,
            received_at: Utc::now(),
        }
    }
}
