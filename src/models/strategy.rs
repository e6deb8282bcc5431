//! Trading strategies and the prediction channel each one reads from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TradingError;

/// Named trading approach selecting the prediction endpoint and the
/// phrases its signals are recognized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    MovingAverage,
    Momentum,
    Macd,
    Sentiment,
    Transformer,
}

/// Exact prediction phrases recognized for a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPhrases {
    pub up: &'static str,
    pub down: &'static str,
    pub neutral: Option<&'static str>,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::MovingAverage,
        Strategy::Momentum,
        Strategy::Macd,
        Strategy::Sentiment,
        Strategy::Transformer,
    ];

    /// Identifier used on the command line and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::MovingAverage => "moving_average",
            Strategy::Momentum => "momentum",
            Strategy::Macd => "macd",
            Strategy::Sentiment => "sentiment",
            Strategy::Transformer => "transformer",
        }
    }

    /// Human-readable name used in notifications and trade reasons.
    pub fn display_name(&self) -> &'static str {
        match self {
            Strategy::MovingAverage => "Moving Average",
            Strategy::Momentum => "Momentum Trading",
            Strategy::Macd => "MACD",
            Strategy::Sentiment => "Sentiment Analysis",
            Strategy::Transformer => "Transformer",
        }
    }

    /// Path of the prediction endpoint serving this strategy.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Strategy::MovingAverage => "/api/predict",
            Strategy::Momentum => "/api/predict-momentum",
            Strategy::Macd => "/api/predict-macd",
            Strategy::Sentiment => "/api/predict-sentiment",
            Strategy::Transformer => "/api/predict-transformer",
        }
    }

    pub fn phrases(&self) -> SignalPhrases {
        match self {
            Strategy::MovingAverage => SignalPhrases {
                up: "📈 Uptrend (Buy)",
                down: "📉 Downtrend (Sell)",
                neutral: None,
            },
            Strategy::Momentum => SignalPhrases {
                up: "📈 Strong Momentum (Buy)",
                down: "📉 Weak Momentum (Sell)",
                neutral: None,
            },
            Strategy::Macd => SignalPhrases {
                up: "📈 MACD Uptrend (Buy)",
                down: "📉 MACD Downtrend (Sell)",
                neutral: Some("↔️ MACD Neutral (Hold)"),
            },
            Strategy::Sentiment => SignalPhrases {
                up: "📈 Positive Sentiment (Buy)",
                down: "📉 Negative Sentiment (Sell)",
                neutral: None,
            },
            Strategy::Transformer => SignalPhrases {
                up: "📈 Transformer Uptrend (Buy)",
                down: "📉 Transformer Downtrend (Sell)",
                neutral: Some("↔️ Transformer Neutral (Hold)"),
            },
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = TradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "moving_average" | "moving-average" => Ok(Strategy::MovingAverage),
            "momentum" | "momentum_trading" | "momentum-trading" => Ok(Strategy::Momentum),
            "macd" => Ok(Strategy::Macd),
            "sentiment" | "sentiment_analysis" | "sentiment-analysis" => Ok(Strategy::Sentiment),
            "transformer" => Ok(Strategy::Transformer),
            other => Err(TradingError::UnknownStrategy(other.to_string())),
        }
    }
}
