//! Trade ledger entries written on every position open and close.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Strategy;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// Title-case label used in close reasons ("Buy", "Sell").
    pub fn label(&self) -> &'static str {
        match self {
            TradeSide::Buy => "Buy",
            TradeSide::Sell => "Sell",
        }
    }

    /// Price movement in this side's favor.
    pub fn favorable_delta(&self, entry_price: Decimal, price: Decimal) -> Decimal {
        match self {
            TradeSide::Buy => price - entry_price,
            TradeSide::Sell => entry_price - price,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Open,
    Close,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Open => "OPEN",
            TradeAction::Close => "CLOSE",
        }
    }
}

/// Immutable record of a position transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Monotonic identifier within a session
    pub id: u64,

    pub action: TradeAction,

    pub side: TradeSide,

    /// Execution price of the transition
    pub price: Decimal,

    /// Units held by the position
    pub quantity: u64,

    /// Realized profit, present only on CLOSE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<Decimal>,

    pub timestamp: DateTime<Utc>,

    /// Why the transition happened (e.g. "Stop loss")
    pub reason: String,

    pub strategy: Strategy,
}

impl TradeRecord {
    pub fn is_close(&self) -> bool {
        self.action == TradeAction::Close
    }
}

impl std::fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{:<4} {} {:<5} {:<4} x{:<5} @ {:.2}",
            self.id,
            self.timestamp.format("%H:%M:%S"),
            self.action.as_str(),
            self.side.as_str(),
            self.quantity,
            self.price
        )?;
        if let Some(profit) = self.profit {
            write!(f, "  P&L {:.2}", profit)?;
        }
        write!(f, "  {}", self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_favorable_delta() {
        assert_eq!(TradeSide::Buy.favorable_delta(dec!(100), dec!(94)), dec!(-6));
        assert_eq!(TradeSide::Sell.favorable_delta(dec!(100), dec!(94)), dec!(6));
    }
}
