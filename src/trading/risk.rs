//! Exit rules: stop loss, take profit, trailing stop.
//!
//! All thresholds are percentages of the entry price measured in the
//! position's favorable direction, so a stop loss and a take profit can
//! never both hold for the same price.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::models::OpenPosition;

use super::TradeSettings;

/// Reason a risk rule closed the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
}

impl ExitReason {
    /// Ledger reason text.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "Stop loss",
            ExitReason::TakeProfit => "Take profit",
            ExitReason::TrailingStop => "Trailing stop",
        }
    }

    /// Whether the exit locks in a gain rather than cutting a loss.
    pub fn is_favorable(&self) -> bool {
        matches!(self, ExitReason::TakeProfit)
    }
}

/// A triggered exit with the numbers that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitSignal {
    pub reason: ExitReason,
    pub price: Decimal,
    /// Favorable percent change from entry at `price`
    pub change_pct: Decimal,
    /// Profit of the position at `price`
    pub profit: Decimal,
}

/// Thresholds taken from the trade settings.
#[derive(Debug, Clone, Copy)]
pub struct RiskRules {
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
    trailing_stop: bool,
}

impl RiskRules {
    pub fn from_settings(settings: &TradeSettings) -> Self {
        Self {
            stop_loss_pct: settings.stop_loss,
            take_profit_pct: settings.take_profit,
            trailing_stop: settings.trailing_stop,
        }
    }

    /// Check whether the position should be closed at `price`.
    ///
    /// Rules are checked in order stop loss, take profit, trailing stop; at
    /// most one exit is returned. The trailing stop only arms once the best
    /// observed price is past the entry in the position's favor.
    pub fn check_exit(&self, position: &OpenPosition, price: Decimal) -> Option<ExitSignal> {
        let change_pct = position.favorable_change_pct(price);
        let signal = |reason| ExitSignal {
            reason,
            price,
            change_pct,
            profit: position.pnl_at(price),
        };

        if change_pct <= -self.stop_loss_pct {
            warn!(
                side = %position.side,
                entry = %position.entry_price,
                price = %price,
                change_pct = %change_pct.round_dp(2),
                "Stop loss triggered"
            );
            return Some(signal(ExitReason::StopLoss));
        }

        if change_pct >= self.take_profit_pct {
            debug!(
                side = %position.side,
                entry = %position.entry_price,
                price = %price,
                change_pct = %change_pct.round_dp(2),
                "Take profit triggered"
            );
            return Some(signal(ExitReason::TakeProfit));
        }

        if self.trailing_stop {
            let best_gain = position.side.favorable_delta(position.entry_price, position.best_price);
            let retracement = position.retracement_pct(price);
            if best_gain > Decimal::ZERO && retracement >= self.stop_loss_pct {
                warn!(
                    side = %position.side,
                    best = %position.best_price,
                    price = %price,
                    retracement_pct = %retracement.round_dp(2),
                    "Trailing stop triggered"
                );
                return Some(signal(ExitReason::TrailingStop));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Strategy, TradeSide};
    use rust_decimal_macros::dec;

    fn rules(trailing: bool) -> RiskRules {
        RiskRules::from_settings(&TradeSettings {
            stop_loss: dec!(5),
            take_profit: dec!(10),
            trailing_stop: trailing,
            ..TradeSettings::default()
        })
    }

    fn position(side: TradeSide) -> OpenPosition {
        OpenPosition::new(side, dec!(100), 10, Strategy::MovingAverage)
    }

    #[test]
    fn test_stop_loss_long() {
        let exit = rules(false).check_exit(&position(TradeSide::Buy), dec!(94)).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.profit, dec!(-60));
        assert_eq!(exit.change_pct, dec!(-6));
    }

    #[test]
    fn test_stop_loss_short() {
        let exit = rules(false).check_exit(&position(TradeSide::Sell), dec!(105)).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.profit, dec!(-50));
    }

    #[test]
    fn test_take_profit_both_sides() {
        let exit = rules(false).check_exit(&position(TradeSide::Buy), dec!(110)).unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert_eq!(exit.profit, dec!(100));

        let exit = rules(false).check_exit(&position(TradeSide::Sell), dec!(89)).unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert_eq!(exit.profit, dec!(110));
    }

    #[test]
    fn test_inside_band_holds() {
        let r = rules(false);
        assert!(r.check_exit(&position(TradeSide::Buy), dec!(96)).is_none());
        assert!(r.check_exit(&position(TradeSide::Buy), dec!(109.99)).is_none());
        assert!(r.check_exit(&position(TradeSide::Sell), dec!(104.99)).is_none());
    }

    #[test]
    fn test_stop_and_target_are_exclusive() {
        let r = rules(false);
        for cents in (8000..12000).step_by(37) {
            let price = Decimal::new(cents, 2);
            for side in [TradeSide::Buy, TradeSide::Sell] {
                let pos = position(side);
                let change = pos.favorable_change_pct(price);
                let stop = change <= dec!(-5);
                let target = change >= dec!(10);
                assert!(!(stop && target));
                match r.check_exit(&pos, price) {
                    Some(exit) if exit.reason == ExitReason::StopLoss => assert!(stop),
                    Some(exit) if exit.reason == ExitReason::TakeProfit => assert!(target),
                    Some(_) => unreachable!("trailing stop is disabled"),
                    None => assert!(!stop && !target),
                }
            }
        }
    }

    #[test]
    fn test_trailing_stop_follows_best_price() {
        let mut pos = position(TradeSide::Buy);
        pos.observe_price(dec!(108));

        // 5% below the 108 peak is 102.6; still above the entry
        let exit = rules(true).check_exit(&pos, dec!(102.6)).unwrap();
        assert_eq!(exit.reason, ExitReason::TrailingStop);
        assert_eq!(exit.profit, dec!(26));

        // Without the flag the same price holds
        assert!(rules(false).check_exit(&pos, dec!(102.6)).is_none());
    }

    #[test]
    fn test_trailing_stop_not_armed_without_gain() {
        let pos = position(TradeSide::Sell);
        assert!(rules(true).check_exit(&pos, dec!(103)).is_none());
    }
}
