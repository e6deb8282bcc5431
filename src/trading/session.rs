//! Trading session: the single owner of position, ledger, notifications,
//! prediction cache and auto-trading state.
//!
//! Every mutation goes through `&mut self`, so the bot task that owns the
//! session is the only writer. Timers and network fetches live outside; the
//! session only sees their results.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TradingError;
use crate::metrics::MetricsCalculator;
use crate::models::{
    ClosedPosition, OpenPosition, Position, Prediction, SessionMetrics, Strategy, TradeAction,
    TradeSide,
};
use crate::pricefeed::PriceSource;

use super::ledger::{LedgerEntry, TradeLedger};
use super::notifier::Notifier;
use super::risk::{ExitReason, ExitSignal, RiskRules};
use super::signal::{interpret, Signal};
use super::TradeSettings;

/// Result of one auto-trading decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Auto trading is off
    Inactive,
    /// The enable-time prediction has not been applied yet
    AwaitingStartup,
    /// The trade cap was reached and auto trading was switched off
    CapReached,
    /// No prediction is cached yet; the caller should fetch one
    AwaitingPrediction,
    /// The prediction carries no actionable signal and nothing is open
    NoSignal,
    /// A position is open and no exit rule fired
    Held,
    /// A risk rule closed the position
    RiskExit(ExitReason),
    /// The signal flipped; the old position was closed
    Reversed { reopened: bool },
    /// A new position was opened
    Opened(TradeSide),
    /// An open was refused (cap or insufficient investment)
    OpenRefused,
}

#[derive(Debug, Clone)]
struct CachedPrediction {
    seq: u64,
    prediction: Prediction,
}

#[derive(Debug, Clone, Copy, Default)]
struct AutoTrading {
    enabled: bool,
    epoch: u64,
    trade_count: u32,
    /// Set on enable, cleared once the startup prediction is applied
    startup_pending: bool,
}

pub struct TradingSession {
    id: Uuid,
    strategy: Strategy,
    settings: TradeSettings,
    risk: RiskRules,
    prices: Box<dyn PriceSource>,
    position: Position,
    ledger: TradeLedger,
    notifier: Notifier,
    prediction: Option<CachedPrediction>,
    auto: AutoTrading,
}

impl TradingSession {
    pub fn new(
        strategy: Strategy,
        settings: TradeSettings,
        prices: Box<dyn PriceSource>,
        retention: usize,
    ) -> Result<Self, TradingError> {
        settings.validate()?;

        let id = Uuid::new_v4();
        info!(
            session = %id,
            strategy = strategy.as_str(),
            investment = %settings.investment,
            max_trades = settings.max_trades,
            "Trading session created"
        );

        Ok(Self {
            id,
            strategy,
            risk: RiskRules::from_settings(&settings),
            settings,
            prices,
            position: Position::default(),
            ledger: TradeLedger::new(retention),
            notifier: Notifier::new(),
            prediction: None,
            auto: AutoTrading::default(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn settings(&self) -> &TradeSettings {
        &self.settings
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    pub fn is_auto_trading(&self) -> bool {
        self.auto.enabled
    }

    pub fn trade_count(&self) -> u32 {
        self.auto.trade_count
    }

    pub fn epoch(&self) -> u64 {
        self.auto.epoch
    }

    /// Whether `epoch` is the current, still enabled auto-trading session.
    pub fn is_auto_session(&self, epoch: u64) -> bool {
        self.auto.enabled && self.auto.epoch == epoch
    }

    /// Replace the trade settings. Only allowed while idle.
    pub fn update_settings(&mut self, settings: TradeSettings) -> Result<(), TradingError> {
        if self.auto.enabled || self.position.is_open() {
            return Err(TradingError::SettingsLocked);
        }
        settings.validate()?;

        self.risk = RiskRules::from_settings(&settings);
        self.settings = settings;
        info!(session = %self.id, "Trade settings updated");
        Ok(())
    }

    // ==================== Position management ====================

    /// Open a position at the current market price.
    pub fn open_position(&mut self, side: TradeSide) -> Result<OpenPosition, TradingError> {
        if self.position.is_open() {
            return Err(TradingError::PositionAlreadyOpen);
        }

        let price = self.prices.current_price();
        let Some(quantity) = self.quantity_at(price) else {
            let err = TradingError::PositionTooLarge {
                investment: self.settings.investment,
                price,
            };
            self.notifier.error(err.to_string());
            return Err(err);
        };
        if quantity < 1 {
            let err = TradingError::InsufficientInvestment {
                investment: self.settings.investment,
                price,
            };
            self.notifier.error(err.to_string());
            return Err(err);
        }

        let opened = OpenPosition::new(side, price, quantity, self.strategy);
        self.position = Position::Open(opened.clone());
        self.ledger.record(LedgerEntry {
            action: TradeAction::Open,
            side,
            price,
            quantity,
            profit: None,
            reason: format!("{} strategy signal", self.strategy.display_name()),
            strategy: self.strategy,
        });

        if self.auto.enabled {
            self.auto.trade_count += 1;
        }

        info!(
            side = %side,
            price = %price,
            quantity = quantity,
            trade_count = self.auto.trade_count,
            "Position opened"
        );
        self.notifier.info(format!(
            "{} position opened at {:.2} ({} strategy)",
            side,
            price,
            self.strategy.display_name()
        ));

        Ok(opened)
    }

    /// Close the open position at the current market price. The profit is
    /// computed from the exit price unless `explicit_profit` is given.
    pub fn close_position(
        &mut self,
        explicit_profit: Option<Decimal>,
        reason: &str,
    ) -> Result<ClosedPosition, TradingError> {
        if !self.position.is_open() {
            return Err(TradingError::NoOpenPosition);
        }
        let price = self.prices.current_price();
        self.close_at(price, explicit_profit, reason)
    }

    fn close_at(
        &mut self,
        price: Decimal,
        explicit_profit: Option<Decimal>,
        reason: &str,
    ) -> Result<ClosedPosition, TradingError> {
        let open = match std::mem::take(&mut self.position) {
            Position::Open(open) => open,
            closed @ Position::Closed { .. } => {
                self.position = closed;
                return Err(TradingError::NoOpenPosition);
            }
        };

        let profit = explicit_profit.unwrap_or_else(|| open.pnl_at(price));
        let closed = ClosedPosition {
            side: open.side,
            entry_price: open.entry_price,
            exit_price: price,
            quantity: open.quantity,
            realized_profit: profit,
            strategy: open.strategy,
            opened_at: open.opened_at,
            closed_at: chrono::Utc::now(),
            reason: reason.to_string(),
        };
        self.position = Position::Closed {
            last: Some(closed.clone()),
        };

        self.ledger.record(LedgerEntry {
            action: TradeAction::Close,
            side: open.side,
            price,
            quantity: open.quantity,
            profit: Some(profit),
            reason: reason.to_string(),
            strategy: open.strategy,
        });

        info!(
            side = %open.side,
            entry = %open.entry_price,
            exit = %price,
            profit = %profit,
            reason = reason,
            "Position closed"
        );
        let message = format!(
            "Position closed with {}: ${:.2}",
            if profit >= Decimal::ZERO { "profit" } else { "loss" },
            profit.abs()
        );
        if profit >= Decimal::ZERO {
            self.notifier.success(message);
        } else {
            self.notifier.error(message);
        }

        Ok(closed)
    }

    /// Apply stop loss, take profit and trailing stop to the open position.
    /// At most one rule fires per call.
    pub fn check_risk_thresholds(&mut self) -> Option<ExitSignal> {
        if !self.position.is_open() {
            return None;
        }

        let price = self.prices.current_price();
        let exit = {
            let open = self.position.open_mut()?;
            open.observe_price(price);
            self.risk.check_exit(open, price)?
        };

        // The close notification supersedes the trigger
        let message = format!("{} triggered at {:.2}", exit.reason.as_str(), exit.price);
        if exit.reason.is_favorable() {
            self.notifier.success(message);
        } else {
            self.notifier.error(message);
        }

        if let Err(e) = self.close_at(exit.price, Some(exit.profit), exit.reason.as_str()) {
            warn!(error = %e, "Risk exit could not close the position");
            return None;
        }

        Some(exit)
    }

    /// Operator buy/sell: open when flat, otherwise close the open position.
    pub fn manual_trade(&mut self, side: TradeSide) -> Result<TradeAction, TradingError> {
        if self.auto.enabled {
            return Err(TradingError::AutoTradingActive);
        }

        if self.position.is_open() {
            self.close_position(None, "Manual close")?;
            Ok(TradeAction::Close)
        } else {
            self.open_position(side)?;
            Ok(TradeAction::Open)
        }
    }

    /// Sample a fresh market price and feed it to the open position's
    /// best-price tracking.
    pub fn observe_price(&mut self) -> Decimal {
        let price = self.prices.current_price();
        if let Some(open) = self.position.open_mut() {
            open.observe_price(price);
        }
        price
    }

    /// Last displayed market price.
    pub fn last_price(&self) -> Decimal {
        self.prices.last_price()
    }

    /// Profit of the open position at the last displayed price.
    pub fn unrealized_pnl(&self) -> Option<Decimal> {
        self.position
            .open()
            .map(|open| open.pnl_at(self.last_price()))
    }

    pub fn metrics(&self) -> SessionMetrics {
        MetricsCalculator::calculate(self.ledger.iter())
    }

    /// Whole units the investment buys at `price`; `None` if that does not
    /// fit a position size.
    fn quantity_at(&self, price: Decimal) -> Option<u64> {
        if price <= Decimal::ZERO {
            return Some(0);
        }
        self.settings
            .investment
            .checked_div(price)
            .and_then(|units| units.floor().to_u64())
    }

    // ==================== Prediction cache ====================

    /// Store a prediction unless a newer request already answered.
    /// Returns whether the cache changed.
    pub fn cache_prediction(&mut self, seq: u64, prediction: Prediction) -> bool {
        if prediction.strategy != self.strategy {
            debug!(
                expected = self.strategy.as_str(),
                got = prediction.strategy.as_str(),
                "Ignoring prediction for another strategy"
            );
            return false;
        }
        if let Some(cached) = &self.prediction {
            if cached.seq >= seq {
                debug!(seq = seq, cached = cached.seq, "Discarding stale prediction");
                return false;
            }
        }

        debug!(seq = seq, raw = %prediction.raw, "Prediction cached");
        self.prediction = Some(CachedPrediction { seq, prediction });
        true
    }

    pub fn cached_prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref().map(|c| &c.prediction)
    }

    /// Signal derived from the cached prediction.
    pub fn current_signal(&self) -> Signal {
        self.cached_prediction()
            .map(|p| interpret(self.strategy, p))
            .unwrap_or(Signal::None)
    }

    // ==================== Auto trading ====================

    /// Enable auto trading and start a new epoch. Returns the epoch the
    /// startup prediction must be applied with.
    pub fn begin_auto_trading(&mut self) -> u64 {
        if self.auto.enabled {
            return self.auto.epoch;
        }

        self.auto.enabled = true;
        self.auto.epoch += 1;
        self.auto.trade_count = 0;
        self.auto.startup_pending = true;

        info!(
            session = %self.id,
            epoch = self.auto.epoch,
            strategy = self.strategy.as_str(),
            "Auto trading enabled"
        );
        self.notifier.info(format!(
            "Auto trading started - using {} strategy",
            self.strategy.display_name()
        ));
        self.auto.epoch
    }

    /// Apply the prediction fetched when auto trading was enabled: close
    /// whatever is open, then open in the signal's direction. Decision cycles
    /// wait for this, so the only position it can close is one held from
    /// before auto trading. Results for a superseded or disabled epoch are
    /// ignored.
    pub fn apply_startup_prediction(
        &mut self,
        epoch: u64,
        prediction: Option<&Prediction>,
    ) -> Option<TradeSide> {
        if !self.is_auto_session(epoch) {
            debug!(epoch = epoch, current = self.auto.epoch, "Ignoring startup prediction");
            return None;
        }
        if !self.auto.startup_pending {
            debug!(epoch = epoch, "Startup prediction already applied");
            return None;
        }
        self.auto.startup_pending = false;

        if self.position.is_open() {
            if let Err(e) = self.close_position(None, "Auto trading started") {
                warn!(error = %e, "Failed to close position on auto trading start");
            }
        }

        let side = prediction.map(|p| interpret(self.strategy, p)).and_then(|s| s.side())?;
        self.auto_open(side).then_some(side)
    }

    /// Switch auto trading off. In-flight fetches stay alive but their
    /// results no longer match an enabled epoch.
    pub fn disable_auto_trading(&mut self) -> bool {
        if !self.auto.enabled {
            return false;
        }
        self.auto.enabled = false;
        info!(
            session = %self.id,
            epoch = self.auto.epoch,
            trades = self.auto.trade_count,
            "Auto trading disabled"
        );
        self.notifier.info("Auto trading stopped");
        true
    }

    /// One decision cycle. The trade cap is checked first.
    pub fn run_decision_cycle(&mut self) -> CycleOutcome {
        if !self.auto.enabled {
            return CycleOutcome::Inactive;
        }
        if self.auto.startup_pending {
            debug!(epoch = self.auto.epoch, "Decision cycle waiting for startup prediction");
            return CycleOutcome::AwaitingStartup;
        }

        if self.auto.trade_count >= self.settings.max_trades {
            info!(
                trades = self.auto.trade_count,
                max_trades = self.settings.max_trades,
                "Trade cap reached"
            );
            self.auto.enabled = false;
            self.notifier.info(format!(
                "Auto trading stopped: Reached maximum {} trades",
                self.settings.max_trades
            ));
            return CycleOutcome::CapReached;
        }

        let Some(cached) = &self.prediction else {
            return CycleOutcome::AwaitingPrediction;
        };
        let signal = interpret(self.strategy, &cached.prediction);
        debug!(signal = %signal, position = ?self.position.side(), "Decision cycle");

        let Some(side) = signal.side() else {
            if !self.position.is_open() {
                return CycleOutcome::NoSignal;
            }
            return self.risk_cycle();
        };

        match self.position.side() {
            Some(held) if held != side => {
                let reason = format!(
                    "Signal changed to {} ({})",
                    side.label(),
                    self.strategy.display_name()
                );
                if let Err(e) = self.close_position(None, &reason) {
                    warn!(error = %e, "Failed to close position on signal change");
                    return CycleOutcome::Held;
                }
                CycleOutcome::Reversed {
                    reopened: self.auto_open(side),
                }
            }
            Some(_) => self.risk_cycle(),
            None => {
                if self.auto_open(side) {
                    CycleOutcome::Opened(side)
                } else {
                    CycleOutcome::OpenRefused
                }
            }
        }
    }

    fn risk_cycle(&mut self) -> CycleOutcome {
        match self.check_risk_thresholds() {
            Some(exit) => CycleOutcome::RiskExit(exit.reason),
            None => CycleOutcome::Held,
        }
    }

    /// Open under auto trading without exceeding the cap.
    fn auto_open(&mut self, side: TradeSide) -> bool {
        if self.auto.trade_count >= self.settings.max_trades {
            debug!(trades = self.auto.trade_count, "Open refused at trade cap");
            return false;
        }
        self.open_position(side).is_ok()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            strategy: self.strategy,
            auto_trading: self.auto.enabled,
            trade_count: self.auto.trade_count,
            max_trades: self.settings.max_trades,
            last_price: self.prices.last_price(),
            position: self.position.open().cloned(),
            last_closed: self.position.last_closed().cloned(),
            unrealized_pnl: self.unrealized_pnl(),
            signal: self.current_signal(),
            prediction: self.cached_prediction().map(|p| p.raw.clone()),
            records: self.ledger.len(),
            realized_pnl: self.ledger.realized_pnl(),
        }
    }
}

/// Point-in-time view of a session for the operator console.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub strategy: Strategy,
    pub auto_trading: bool,
    pub trade_count: u32,
    pub max_trades: u32,
    pub last_price: Decimal,
    pub position: Option<OpenPosition>,
    pub last_closed: Option<ClosedPosition>,
    pub unrealized_pnl: Option<Decimal>,
    pub signal: Signal,
    pub prediction: Option<String>,
    pub records: usize,
    pub realized_pnl: Decimal,
}

impl fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Strategy:      {}", self.strategy.display_name())?;
        writeln!(
            f,
            "Auto trading:  {} ({}/{} trades)",
            if self.auto_trading { "ON" } else { "OFF" },
            self.trade_count,
            self.max_trades
        )?;
        writeln!(f, "Market price:  {:.2}", self.last_price)?;
        match &self.position {
            Some(open) => writeln!(
                f,
                "Position:      {} {} @ {:.2} (P&L ${:.2})",
                open.side,
                open.quantity,
                open.entry_price,
                self.unrealized_pnl.unwrap_or_default()
            )?,
            None => match &self.last_closed {
                Some(last) => writeln!(
                    f,
                    "Position:      none (last {} {:.2} -> {:.2}, ${:.2}, {})",
                    last.side, last.entry_price, last.exit_price, last.realized_profit, last.reason
                )?,
                None => writeln!(f, "Position:      none")?,
            },
        }
        writeln!(
            f,
            "Prediction:    {} -> {}",
            self.prediction.as_deref().unwrap_or("(none)"),
            self.signal
        )?;
        write!(
            f,
            "Ledger:        {} records, realized ${:.2}",
            self.records, self.realized_pnl
        )
    }
}
