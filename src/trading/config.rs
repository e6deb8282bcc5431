//! Trade settings.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::TradingError;

/// Chart interval the operator trades on. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFrame {
    #[serde(rename = "1m")]
    OneMinute,
    #[default]
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::OneMinute => "1m",
            TimeFrame::FiveMinutes => "5m",
            TimeFrame::FifteenMinutes => "15m",
            TimeFrame::OneHour => "1h",
            TimeFrame::FourHours => "4h",
            TimeFrame::OneDay => "1d",
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFrame {
    type Err = TradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(TimeFrame::OneMinute),
            "5m" => Ok(TimeFrame::FiveMinutes),
            "15m" => Ok(TimeFrame::FifteenMinutes),
            "1h" => Ok(TimeFrame::OneHour),
            "4h" => Ok(TimeFrame::FourHours),
            "1d" => Ok(TimeFrame::OneDay),
            other => Err(TradingError::InvalidSettings(format!("unknown time frame '{}'", other))),
        }
    }
}

/// Configuration for position sizing and risk controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TradeSettings {
    /// Amount invested per position
    pub investment: Decimal,

    /// Stop loss in percent of entry price (e.g., 5 = 5%)
    pub stop_loss: Decimal,

    /// Take profit in percent of entry price
    pub take_profit: Decimal,

    /// Trail the stop behind the best price seen since open
    pub trailing_stop: bool,

    /// Maximum positions opened per auto-trading session
    pub max_trades: u32,

    pub time_frame: TimeFrame,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            investment: dec!(1000),
            stop_loss: dec!(5),
            take_profit: dec!(10),
            trailing_stop: false,
            max_trades: 5,
            time_frame: TimeFrame::FiveMinutes,
        }
    }
}

impl TradeSettings {
    /// Load settings from a JSON file using the dashboard's field names.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: TradeSettings = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), TradingError> {
        if self.investment <= Decimal::ZERO {
            return Err(TradingError::InvalidSettings("investment must be positive".into()));
        }
        if self.stop_loss <= Decimal::ZERO {
            return Err(TradingError::InvalidSettings("stop loss must be positive".into()));
        }
        if self.take_profit <= Decimal::ZERO {
            return Err(TradingError::InvalidSettings("take profit must be positive".into()));
        }
        if self.max_trades == 0 {
            return Err(TradingError::InvalidSettings("max trades must be at least 1".into()));
        }
        Ok(())
    }

    /// Copy of these settings with one field changed. Field names follow the
    /// JSON file (`stopLoss`); case and underscores are ignored.
    pub fn with_field(&self, field: &str, value: &str) -> Result<Self, TradingError> {
        let invalid = |what: &str| {
            TradingError::InvalidSettings(format!("invalid {} '{}'", what, value))
        };
        let mut settings = self.clone();

        match field.replace('_', "").to_lowercase().as_str() {
            "investment" => {
                settings.investment = value.parse().map_err(|_| invalid("investment"))?;
            }
            "stoploss" => {
                settings.stop_loss = value.parse().map_err(|_| invalid("stop loss"))?;
            }
            "takeprofit" => {
                settings.take_profit = value.parse().map_err(|_| invalid("take profit"))?;
            }
            "trailingstop" => {
                settings.trailing_stop = match value.to_lowercase().as_str() {
                    "true" | "on" | "yes" => true,
                    "false" | "off" | "no" => false,
                    _ => return Err(invalid("trailing stop")),
                };
            }
            "maxtrades" => {
                settings.max_trades = value.parse().map_err(|_| invalid("max trades"))?;
            }
            "timeframe" => {
                settings.time_frame = value.parse()?;
            }
            _ => {
                return Err(TradingError::InvalidSettings(format!(
                    "unknown setting '{}' (investment, stopLoss, takeProfit, trailingStop, maxTrades, timeFrame)",
                    field
                )));
            }
        }

        Ok(settings)
    }
}
