//! The session's single simulated position.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Strategy, TradeSide};

/// A position currently held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: TradeSide,

    /// Price at which the position was opened
    pub entry_price: Decimal,

    /// Whole units bought or sold short
    pub quantity: u64,

    pub strategy: Strategy,

    pub opened_at: DateTime<Utc>,

    /// Most favorable price observed since open (trailing stop anchor)
    pub best_price: Decimal,
}

impl OpenPosition {
    pub fn new(side: TradeSide, entry_price: Decimal, quantity: u64, strategy: Strategy) -> Self {
        Self {
            side,
            entry_price,
            quantity,
            strategy,
            opened_at: Utc::now(),
            best_price: entry_price,
        }
    }

    /// Profit if the position were closed at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        Decimal::from(self.quantity) * self.side.favorable_delta(self.entry_price, price)
    }

    /// Percent move in the position's favor relative to entry.
    pub fn favorable_change_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        self.side.favorable_delta(self.entry_price, price) / self.entry_price * Decimal::ONE_HUNDRED
    }

    /// Record a price observation, moving the best price if it improved.
    pub fn observe_price(&mut self, price: Decimal) {
        let improved = match self.side {
            TradeSide::Buy => price > self.best_price,
            TradeSide::Sell => price < self.best_price,
        };
        if improved {
            self.best_price = price;
        }
    }

    /// Percent retracement from the best observed price, against the position.
    pub fn retracement_pct(&self, price: Decimal) -> Decimal {
        if self.best_price.is_zero() {
            return Decimal::ZERO;
        }
        -self.side.favorable_delta(self.best_price, price) / self.best_price * Decimal::ONE_HUNDRED
    }
}

/// Summary of the most recently closed position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub side: TradeSide,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: u64,
    pub realized_profit: Decimal,
    pub strategy: Strategy,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub reason: String,
}

/// At most one position exists; entry price and quantity only exist while open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Position {
    Closed { last: Option<ClosedPosition> },
    Open(OpenPosition),
}

impl Default for Position {
    fn default() -> Self {
        Position::Closed { last: None }
    }
}

impl Position {
    pub fn is_open(&self) -> bool {
        matches!(self, Position::Open(_))
    }

    pub fn open(&self) -> Option<&OpenPosition> {
        match self {
            Position::Open(open) => Some(open),
            Position::Closed { .. } => None,
        }
    }

    pub fn open_mut(&mut self) -> Option<&mut OpenPosition> {
        match self {
            Position::Open(open) => Some(open),
            Position::Closed { .. } => None,
        }
    }

    pub fn side(&self) -> Option<TradeSide> {
        self.open().map(|p| p.side)
    }

    pub fn last_closed(&self) -> Option<&ClosedPosition> {
        match self {
            Position::Closed { last } => last.as_ref(),
            Position::Open(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_pnl() {
        let buy = OpenPosition::new(TradeSide::Buy, dec!(100), 10, Strategy::MovingAverage);
        assert_eq!(buy.pnl_at(dec!(103)), dec!(30));
        assert_eq!(buy.pnl_at(dec!(94)), dec!(-60));

        let sell = OpenPosition::new(TradeSide::Sell, dec!(100), 10, Strategy::MovingAverage);
        assert_eq!(sell.pnl_at(dec!(94)), dec!(60));
        assert_eq!(sell.pnl_at(dec!(103)), dec!(-30));
    }

    #[test]
    fn test_favorable_change_pct() {
        let buy = OpenPosition::new(TradeSide::Buy, dec!(100), 10, Strategy::Macd);
        assert_eq!(buy.favorable_change_pct(dec!(94)), dec!(-6));

        let sell = OpenPosition::new(TradeSide::Sell, dec!(100), 10, Strategy::Macd);
        assert_eq!(sell.favorable_change_pct(dec!(94)), dec!(6));
    }

    #[test]
    fn test_best_price_tracking() {
        let mut sell = OpenPosition::new(TradeSide::Sell, dec!(100), 5, Strategy::Momentum);
        sell.observe_price(dec!(102));
        assert_eq!(sell.best_price, dec!(100));
        sell.observe_price(dec!(95));
        sell.observe_price(dec!(97));
        assert_eq!(sell.best_price, dec!(95));

        // 95 -> 99.75 is a 5% move against a short
        assert_eq!(sell.retracement_pct(dec!(99.75)), dec!(5));
    }

    #[test]
    fn test_default_is_closed() {
        let position = Position::default();
        assert!(!position.is_open());
        assert!(position.last_closed().is_none());
        assert!(position.open().is_none());
        assert!(position.side().is_none());
    }
}
