//! Bot runner: the single task that owns the trading session.
//!
//! Handles:
//! - Operator commands read from the console
//! - Scheduler ticks (decision cycle, prediction refresh, price refresh)
//! - Prediction results reported back by spawned fetch tasks
//! - Ctrl+C shutdown

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::PredictionSource;
use crate::error::TradingError;
use crate::models::{Prediction, Strategy, TradeSide};
use crate::pricefeed::PriceSource;
use crate::scheduler::{ScheduleConfig, Scheduler, TaskKind};
use crate::trading::{CycleOutcome, TradeSettings, TradingSession, DEFAULT_RETENTION};

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub strategy: Strategy,

    pub settings: TradeSettings,

    /// Trade records kept in memory
    pub history_limit: usize,

    /// Enable auto trading as soon as the bot starts
    pub auto_start: bool,

    pub schedule: ScheduleConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::MovingAverage,
            settings: TradeSettings::default(),
            history_limit: DEFAULT_RETENTION,
            auto_start: false,
            schedule: ScheduleConfig::default(),
        }
    }
}

/// Operator console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Buy,
    Sell,
    Close,
    ToggleAuto,
    Status,
    History(usize),
    /// Change one trade setting while idle
    Set { field: String, value: String },
    Dismiss,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            bail!("Empty command");
        };

        let command = match word.to_lowercase().as_str() {
            "buy" | "b" => Command::Buy,
            "sell" | "s" => Command::Sell,
            "close" | "c" => Command::Close,
            "auto" | "a" => Command::ToggleAuto,
            "status" | "st" => Command::Status,
            "history" | "h" => {
                let count = match parts.next() {
                    Some(n) => n
                        .parse()
                        .map_err(|_| anyhow::anyhow!("Invalid history count: {}", n))?,
                    None => 10,
                };
                Command::History(count)
            }
            "set" => match (parts.next(), parts.next()) {
                (Some(field), Some(value)) => Command::Set {
                    field: field.to_string(),
                    value: value.to_string(),
                },
                _ => bail!("Usage: set <investment|stopLoss|takeProfit|trailingStop|maxTrades|timeFrame> <value>"),
            },
            "dismiss" | "d" => Command::Dismiss,
            "quit" | "q" | "exit" => Command::Quit,
            other => bail!(
                "Unknown command '{}' (buy, sell, close, auto, status, history [n], set <field> <value>, dismiss, quit)",
                other
            ),
        };
        Ok(command)
    }
}

/// Why a prediction was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPurpose {
    /// Initial prediction shown when the bot starts
    Startup,
    /// Prediction that drives the auto-trading startup trade
    EnableAuto,
    /// Requested by a decision cycle that had nothing cached
    Cycle,
    /// Periodic background refresh
    Refresh,
}

/// Result of a spawned prediction fetch.
#[derive(Debug)]
struct PredictionUpdate {
    seq: u64,
    epoch: u64,
    purpose: FetchPurpose,
    prediction: Option<Prediction>,
}

enum Event {
    Tick(TaskKind),
    Command(Command),
    CommandsClosed,
    Prediction(PredictionUpdate),
    Shutdown,
}

pub struct Bot {
    config: BotConfig,
    session: TradingSession,
    scheduler: Scheduler,
    source: Arc<dyn PredictionSource>,
    updates_tx: mpsc::UnboundedSender<PredictionUpdate>,
    updates_rx: mpsc::UnboundedReceiver<PredictionUpdate>,
    next_seq: u64,
    /// Sequence number of the fetch a decision cycle is waiting on
    cycle_in_flight: Option<u64>,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        source: Arc<dyn PredictionSource>,
        prices: Box<dyn PriceSource>,
    ) -> Result<Self> {
        let session = TradingSession::new(
            config.strategy,
            config.settings.clone(),
            prices,
            config.history_limit,
        )?;
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        Ok(Self {
            scheduler: Scheduler::new(config.schedule),
            config,
            session,
            source,
            updates_tx,
            updates_rx,
            next_seq: 0,
            cycle_in_flight: None,
        })
    }

    /// Main run loop. Returns when the operator quits or Ctrl+C is pressed.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) -> Result<()> {
        info!(
            session = %self.session.id(),
            strategy = self.session.strategy().as_str(),
            auto_start = self.config.auto_start,
            "Starting bot run loop"
        );

        self.scheduler.start(TaskKind::PriceRefresh);
        self.session.observe_price();
        self.spawn_fetch(FetchPurpose::Startup);
        if self.config.auto_start {
            self.toggle_auto_trading();
        }

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut commands_open = true;

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => Event::Shutdown,
                kind = self.scheduler.next() => Event::Tick(kind),
                Some(update) = self.updates_rx.recv() => Event::Prediction(update),
                command = commands.recv(), if commands_open => match command {
                    Some(command) => Event::Command(command),
                    None => Event::CommandsClosed,
                },
            };

            match event {
                Event::Tick(kind) => self.handle_tick(kind),
                Event::Prediction(update) => self.handle_prediction(update),
                Event::Command(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Event::CommandsClosed => {
                    info!("Console input closed; press Ctrl+C to stop");
                    commands_open = false;
                }
                Event::Shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    fn handle_tick(&mut self, kind: TaskKind) {
        debug!(task = kind.as_str(), "Scheduler tick");
        match kind {
            TaskKind::PriceRefresh => {
                self.session.observe_price();
                self.session.notifier_mut().clear_expired();
            }
            TaskKind::PredictionRefresh => {
                if self.session.is_auto_trading() {
                    self.spawn_fetch(FetchPurpose::Refresh);
                }
            }
            TaskKind::DecisionCycle => {
                if let Some(seq) = self.cycle_in_flight {
                    debug!(seq = seq, "Decision cycle skipped, prediction fetch in flight");
                    return;
                }
                let outcome = self.session.run_decision_cycle();
                if outcome == CycleOutcome::AwaitingPrediction {
                    self.cycle_in_flight = Some(self.spawn_fetch(FetchPurpose::Cycle));
                }
                self.after_cycle(outcome);
            }
        }
    }

    fn handle_prediction(&mut self, update: PredictionUpdate) {
        match &update.prediction {
            Some(prediction) => {
                self.session.cache_prediction(update.seq, prediction.clone());
            }
            None => {
                let message = format!(
                    "Failed to fetch {} prediction",
                    self.session.strategy().display_name()
                );
                self.session.notifier_mut().error(message);
            }
        }

        match update.purpose {
            FetchPurpose::EnableAuto => {
                self.session
                    .apply_startup_prediction(update.epoch, update.prediction.as_ref());
                self.sync_schedule();
            }
            FetchPurpose::Cycle => {
                if self.cycle_in_flight == Some(update.seq) {
                    self.cycle_in_flight = None;
                }
                if update.prediction.is_some() && self.session.is_auto_session(update.epoch) {
                    let outcome = self.session.run_decision_cycle();
                    self.after_cycle(outcome);
                }
            }
            FetchPurpose::Startup | FetchPurpose::Refresh => {}
        }
    }

    /// Apply an operator command. Returns false when the bot should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        debug!(command = ?command, "Operator command");
        match command {
            Command::Buy => self.manual_trade(TradeSide::Buy),
            Command::Sell => self.manual_trade(TradeSide::Sell),
            Command::Close => {
                let result = if self.session.is_auto_trading() {
                    Err(TradingError::AutoTradingActive)
                } else {
                    self.session.close_position(None, "Manual close").map(|_| ())
                };
                self.report_rejection(result);
            }
            Command::ToggleAuto => self.toggle_auto_trading(),
            Command::Status => self.print_status(),
            Command::History(count) => self.print_history(count),
            Command::Set { field, value } => self.update_setting(&field, &value),
            Command::Dismiss => self.session.notifier_mut().dismiss(),
            Command::Quit => return false,
        }
        true
    }

    fn manual_trade(&mut self, side: TradeSide) {
        let result = self.session.manual_trade(side).map(|_| ());
        self.report_rejection(result);
    }

    fn update_setting(&mut self, field: &str, value: &str) {
        let result = self
            .session
            .settings()
            .with_field(field, value)
            .and_then(|settings| self.session.update_settings(settings));

        match result {
            Ok(()) => self
                .session
                .notifier_mut()
                .info(format!("Settings updated: {} = {}", field, value)),
            Err(e) => self.report_rejection(Err(e)),
        }
    }

    fn report_rejection(&mut self, result: Result<(), TradingError>) {
        match result {
            Ok(()) => {}
            // Already surfaced by the session
            Err(TradingError::InsufficientInvestment { .. }) => {}
            Err(e) => self.session.notifier_mut().error(e.to_string()),
        }
    }

    fn toggle_auto_trading(&mut self) {
        // Fetches from the previous session can no longer release the guard
        self.cycle_in_flight = None;
        if self.session.is_auto_trading() {
            self.session.disable_auto_trading();
        } else {
            self.session.begin_auto_trading();
            self.spawn_fetch(FetchPurpose::EnableAuto);
        }
        self.sync_schedule();
    }

    fn after_cycle(&mut self, outcome: CycleOutcome) {
        debug!(outcome = ?outcome, trades = self.session.trade_count(), "Decision cycle finished");
        if outcome == CycleOutcome::CapReached {
            self.sync_schedule();
        }
    }

    /// Keep the decision and refresh timers in step with the session.
    fn sync_schedule(&mut self) {
        self.scheduler.set_auto_trading(self.session.is_auto_trading());
    }

    /// Fetch a prediction on a separate task. The result comes back through
    /// the update channel tagged with its sequence number and epoch.
    fn spawn_fetch(&mut self, purpose: FetchPurpose) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        let epoch = self.session.epoch();
        let strategy = self.session.strategy();
        let source = Arc::clone(&self.source);
        let tx = self.updates_tx.clone();

        debug!(seq = seq, epoch = epoch, purpose = ?purpose, "Fetching prediction");
        tokio::spawn(async move {
            let prediction = source.fetch_prediction(strategy).await;
            let update = PredictionUpdate {
                seq,
                epoch,
                purpose,
                prediction,
            };
            if tx.send(update).is_err() {
                debug!(seq = seq, "Bot stopped before prediction arrived");
            }
        });
        seq
    }

    fn print_status(&self) {
        println!("\n=== Session Status ===");
        println!("{}", self.session.snapshot());
        if let Some(notification) = self.session.notifier().current() {
            println!("Notification:  {}", notification);
        }
        println!("\n{}", self.session.metrics());
    }

    fn print_history(&self, count: usize) {
        if self.session.ledger().is_empty() {
            println!("No trades yet.");
            return;
        }
        println!("\n=== Trade History ({} total) ===", self.session.ledger().total_recorded());
        for record in self.session.ledger().iter().take(count) {
            println!("{}", record);
        }
    }

    /// Graceful shutdown.
    fn shutdown(&mut self) {
        info!("Shutting down bot...");
        self.scheduler.stop_all();
        if self.session.is_auto_trading() {
            self.session.disable_auto_trading();
        }

        if let Some(pnl) = self.session.unrealized_pnl() {
            warn!(unrealized_pnl = %pnl, "Position still open at shutdown");
        }
        println!("\n{}", self.session.metrics());
        info!("Bot shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeAction;
    use crate::pricefeed::ScriptedPriceFeed;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses; `None` entries simulate a failed fetch.
    struct FakeSource {
        responses: Mutex<VecDeque<Option<&'static str>>>,
    }

    impl FakeSource {
        fn new(responses: &[Option<&'static str>]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().copied().collect()),
            })
        }
    }

    #[async_trait]
    impl PredictionSource for FakeSource {
        async fn fetch_prediction(&self, strategy: Strategy) -> Option<Prediction> {
            let next = self.responses.lock().unwrap().pop_front().flatten();
            next.map(|raw| Prediction::parse(strategy, raw))
        }
    }

    const UP: &str = "📈 Uptrend (Buy)";
    const DOWN: &str = "📉 Downtrend (Sell)";

    fn bot(responses: &[Option<&'static str>], config: BotConfig) -> Bot {
        Bot::new(
            config,
            FakeSource::new(responses),
            Box::new(ScriptedPriceFeed::new(&[dec!(100)])),
        )
        .unwrap()
    }

    async fn deliver_next(bot: &mut Bot) {
        let update = bot.updates_rx.recv().await.unwrap();
        bot.handle_prediction(update);
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!("buy".parse::<Command>().unwrap(), Command::Buy);
        assert_eq!(" SELL ".parse::<Command>().unwrap(), Command::Sell);
        assert_eq!("auto".parse::<Command>().unwrap(), Command::ToggleAuto);
        assert_eq!("history 3".parse::<Command>().unwrap(), Command::History(3));
        assert_eq!("h".parse::<Command>().unwrap(), Command::History(10));
        assert_eq!("q".parse::<Command>().unwrap(), Command::Quit);
        assert!("history many".parse::<Command>().is_err());
        assert_eq!(
            "set stopLoss 2.5".parse::<Command>().unwrap(),
            Command::Set {
                field: "stopLoss".to_string(),
                value: "2.5".to_string(),
            }
        );
        assert!("set stopLoss".parse::<Command>().is_err());
        assert!("launch".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }

    #[tokio::test]
    async fn test_enable_auto_opens_from_startup_prediction() {
        let mut bot = bot(&[Some(UP)], BotConfig::default());
        assert!(bot.handle_command(Command::ToggleAuto));
        assert!(bot.scheduler.is_running(TaskKind::DecisionCycle));
        assert!(bot.scheduler.is_running(TaskKind::PredictionRefresh));

        deliver_next(&mut bot).await;

        assert_eq!(bot.session.position().side(), Some(TradeSide::Buy));
        assert_eq!(bot.session.trade_count(), 1);
        assert!(bot.session.cached_prediction().is_some());
    }

    #[tokio::test]
    async fn test_result_after_disable_touches_no_position() {
        let mut bot = bot(&[Some(UP)], BotConfig::default());
        bot.handle_command(Command::ToggleAuto);
        bot.handle_command(Command::ToggleAuto);
        assert!(!bot.scheduler.is_running(TaskKind::DecisionCycle));

        deliver_next(&mut bot).await;

        assert!(!bot.session.position().is_open());
        assert!(bot.session.ledger().is_empty());
        // The prediction itself is still worth caching
        assert!(bot.session.cached_prediction().is_some());
    }

    #[tokio::test]
    async fn test_cycle_fetches_when_nothing_cached() {
        let mut bot = bot(&[None, Some(DOWN)], BotConfig::default());
        bot.handle_command(Command::ToggleAuto);
        // Startup fetch fails: error notification, nothing opened
        deliver_next(&mut bot).await;
        let note = bot.session.notifier().current().unwrap();
        assert_eq!(note.to_string(), "[ERROR] Failed to fetch Moving Average prediction");

        bot.handle_tick(TaskKind::DecisionCycle);
        assert!(bot.cycle_in_flight.is_some());
        let seq = bot.next_seq;

        // A second tick while the fetch is in flight does nothing
        bot.handle_tick(TaskKind::DecisionCycle);
        assert_eq!(bot.next_seq, seq);

        deliver_next(&mut bot).await;
        assert!(bot.cycle_in_flight.is_none());
        assert_eq!(bot.session.position().side(), Some(TradeSide::Sell));
    }

    #[tokio::test]
    async fn test_failed_cycle_fetch_skips_cycle() {
        let mut bot = bot(&[None, None], BotConfig::default());
        bot.handle_command(Command::ToggleAuto);
        deliver_next(&mut bot).await;

        bot.handle_tick(TaskKind::DecisionCycle);
        deliver_next(&mut bot).await;

        assert!(bot.cycle_in_flight.is_none());
        assert!(bot.session.cached_prediction().is_none());
        assert!(bot.session.ledger().is_empty());
        assert!(bot.session.is_auto_trading());

        // The next tick tries again
        bot.handle_tick(TaskKind::DecisionCycle);
        assert!(bot.cycle_in_flight.is_some());
    }

    #[tokio::test]
    async fn test_cycle_result_from_previous_session_keeps_guard() {
        let mut bot = bot(&[], BotConfig::default());
        bot.handle_command(Command::ToggleAuto);
        deliver_next(&mut bot).await;
        bot.handle_tick(TaskKind::DecisionCycle);
        let stale = bot.cycle_in_flight.unwrap();
        let stale_epoch = bot.session.epoch();

        // Restart auto trading while that fetch is still out
        bot.handle_command(Command::ToggleAuto);
        bot.handle_command(Command::ToggleAuto);
        assert!(bot.cycle_in_flight.is_none());
        // Both the old cycle fetch and the new startup fetch fail
        deliver_next(&mut bot).await;
        deliver_next(&mut bot).await;

        bot.handle_tick(TaskKind::DecisionCycle);
        let pending = bot.cycle_in_flight.unwrap();
        assert_ne!(pending, stale);

        let strategy = bot.session.strategy();
        bot.handle_prediction(PredictionUpdate {
            seq: stale,
            epoch: stale_epoch,
            purpose: FetchPurpose::Cycle,
            prediction: Some(Prediction::parse(strategy, UP)),
        });

        assert_eq!(bot.cycle_in_flight, Some(pending));
        assert!(bot.session.ledger().is_empty());
        let seq = bot.next_seq;
        bot.handle_tick(TaskKind::DecisionCycle);
        assert_eq!(bot.next_seq, seq);
    }

    #[tokio::test]
    async fn test_first_cycle_waits_for_enable_prediction() {
        let mut bot = bot(&[Some(UP), Some(UP)], BotConfig::default());
        bot.spawn_fetch(FetchPurpose::Startup);
        deliver_next(&mut bot).await;
        assert!(bot.session.cached_prediction().is_some());

        bot.handle_command(Command::ToggleAuto);
        // The decision tick fires before the enable fetch has answered
        bot.handle_tick(TaskKind::DecisionCycle);
        assert!(bot.session.ledger().is_empty());
        assert!(bot.cycle_in_flight.is_none());

        deliver_next(&mut bot).await;
        bot.handle_tick(TaskKind::DecisionCycle);

        assert_eq!(bot.session.ledger().len(), 1);
        assert_eq!(bot.session.trade_count(), 1);
        assert_eq!(bot.session.position().side(), Some(TradeSide::Buy));
    }

    #[tokio::test]
    async fn test_set_command_only_applies_while_idle() {
        let mut bot = bot(&[Some(UP)], BotConfig::default());

        bot.handle_command(Command::Set {
            field: "stopLoss".to_string(),
            value: "2".to_string(),
        });
        assert_eq!(bot.session.settings().stop_loss, dec!(2));
        assert_eq!(
            bot.session.notifier().current().unwrap().message,
            "Settings updated: stopLoss = 2"
        );

        bot.handle_command(Command::ToggleAuto);
        bot.handle_command(Command::Set {
            field: "maxTrades".to_string(),
            value: "3".to_string(),
        });
        assert_eq!(bot.session.settings().max_trades, 5);
        assert_eq!(
            bot.session.notifier().current().unwrap().message,
            TradingError::SettingsLocked.to_string()
        );

        bot.handle_command(Command::ToggleAuto);
        bot.handle_command(Command::Set {
            field: "takeProfit".to_string(),
            value: "0".to_string(),
        });
        assert_eq!(bot.session.settings().take_profit, dec!(10));
        assert!(bot
            .session
            .notifier()
            .current()
            .unwrap()
            .message
            .starts_with("Invalid settings"));
    }

    #[tokio::test]
    async fn test_stale_update_does_not_replace_newer_prediction() {
        let mut bot = bot(&[], BotConfig::default());
        let strategy = bot.session.strategy();

        bot.handle_prediction(PredictionUpdate {
            seq: 2,
            epoch: 0,
            purpose: FetchPurpose::Refresh,
            prediction: Some(Prediction::parse(strategy, DOWN)),
        });
        bot.handle_prediction(PredictionUpdate {
            seq: 1,
            epoch: 0,
            purpose: FetchPurpose::Refresh,
            prediction: Some(Prediction::parse(strategy, UP)),
        });

        assert_eq!(bot.session.cached_prediction().unwrap().raw, DOWN);
    }

    #[tokio::test]
    async fn test_cap_stops_timers() {
        let config = BotConfig {
            settings: TradeSettings {
                max_trades: 1,
                ..TradeSettings::default()
            },
            ..BotConfig::default()
        };
        let mut bot = bot(&[Some(UP)], config);
        bot.handle_command(Command::ToggleAuto);
        deliver_next(&mut bot).await;
        assert_eq!(bot.session.trade_count(), 1);

        bot.handle_tick(TaskKind::DecisionCycle);

        assert!(!bot.session.is_auto_trading());
        assert!(!bot.scheduler.is_running(TaskKind::DecisionCycle));
        assert!(!bot.scheduler.is_running(TaskKind::PredictionRefresh));
    }

    #[tokio::test]
    async fn test_manual_commands() {
        let mut bot = bot(&[Some(UP)], BotConfig::default());
        bot.handle_command(Command::Buy);
        assert_eq!(bot.session.position().side(), Some(TradeSide::Buy));

        bot.handle_command(Command::Close);
        assert_eq!(bot.session.ledger().latest().unwrap().action, TradeAction::Close);

        bot.handle_command(Command::Close);
        let note = bot.session.notifier().current().unwrap();
        assert_eq!(note.message, TradingError::NoOpenPosition.to_string());

        bot.handle_command(Command::ToggleAuto);
        bot.handle_command(Command::Sell);
        let note = bot.session.notifier().current().unwrap();
        assert_eq!(note.message, TradingError::AutoTradingActive.to_string());

        bot.handle_command(Command::Dismiss);
        assert!(bot.session.notifier().current().is_none());
        assert!(!bot.handle_command(Command::Quit));
    }
}
