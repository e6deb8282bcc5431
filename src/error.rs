//! Engine-level rejections raised by the trading session.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradingError {
    /// `open` requires the position to be closed.
    #[error("A position is already open")]
    PositionAlreadyOpen,

    /// `close` requires an open position.
    #[error("No open position to close")]
    NoOpenPosition,

    /// The configured investment buys less than one unit at the current price.
    #[error("Investment ${investment} buys less than one unit at {price}")]
    InsufficientInvestment { investment: Decimal, price: Decimal },

    #[error("Investment ${investment} at {price} exceeds the maximum position size")]
    PositionTooLarge { investment: Decimal, price: Decimal },

    /// Manual actions are disabled while the engine trades on its own.
    #[error("Auto trading is active; stop it before trading manually")]
    AutoTradingActive,

    /// Settings may only change while nothing is open and auto trading is off.
    #[error("Settings are locked while a position is open or auto trading is active")]
    SettingsLocked,

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
}
