//! Signal-driven trading simulator
//!
//! Follows a prediction service's buy/sell signals with a single simulated
//! position, guarded by stop-loss, take-profit and trailing-stop rules.

mod api;
mod bot;
mod error;
mod metrics;
mod models;
mod pricefeed;
mod scheduler;
mod trading;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{PredictionClient, ServiceConfig};
use crate::bot::{Bot, BotConfig, Command};
use crate::models::Strategy;
use crate::pricefeed::SimulatedPriceFeed;
use crate::scheduler::ScheduleConfig;
use crate::trading::{interpret, TimeFrame, TradeSettings, DEFAULT_RETENTION};

/// Signal-driven trading simulator CLI.
#[derive(Parser)]
#[command(name = "sigtrader")]
#[command(about = "Trade a simulated position on prediction-service signals", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Base URL of the data service
    #[arg(long, env = "SIGTRADER_DATA_URL", default_value = "http://localhost:5000")]
    data_url: String,

    /// Base URL of the prediction service
    #[arg(long, env = "SIGTRADER_PREDICT_URL", default_value = "http://localhost:5001")]
    predict_url: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "SIGTRADER_TIMEOUT_SECS", default_value = "5")]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a live trading session
    Run {
        /// Strategy (moving_average, momentum, macd, sentiment, transformer)
        #[arg(short, long, default_value = "moving_average")]
        strategy: String,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Enable auto trading immediately
        #[arg(long)]
        auto: bool,

        /// Trade records kept in memory
        #[arg(long, default_value_t = DEFAULT_RETENTION)]
        history_limit: usize,
    },

    /// Fetch one prediction and show the signal it produces
    Predict {
        /// Strategy to query
        #[arg(short, long, default_value = "moving_average")]
        strategy: String,
    },

    /// List strategies, their endpoints and recognized phrases
    Strategies,

    /// Show the effective configuration
    Config {
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

/// Trade settings overrides; unset values come from the settings file or
/// the defaults.
#[derive(clap::Args)]
struct SettingsArgs {
    /// JSON settings file (investment, stopLoss, takeProfit, trailingStop, maxTrades, timeFrame)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Amount invested per position
    #[arg(short, long)]
    investment: Option<f64>,

    /// Stop loss in percent
    #[arg(long)]
    stop_loss: Option<f64>,

    /// Take profit in percent
    #[arg(long)]
    take_profit: Option<f64>,

    /// Trail the stop behind the best price since open
    #[arg(long)]
    trailing_stop: bool,

    /// Maximum positions opened per auto-trading session
    #[arg(long)]
    max_trades: Option<u32>,

    /// Chart time frame (1m, 5m, 15m, 1h, 4h, 1d)
    #[arg(long)]
    time_frame: Option<String>,
}

impl SettingsArgs {
    fn resolve(&self) -> Result<TradeSettings> {
        let mut settings = match &self.settings {
            Some(path) => TradeSettings::from_json_file(path)?,
            None => TradeSettings::default(),
        };

        if let Some(investment) = self.investment {
            settings.investment = Decimal::try_from(investment).context("Invalid investment")?;
        }
        if let Some(stop_loss) = self.stop_loss {
            settings.stop_loss = Decimal::try_from(stop_loss).context("Invalid stop loss")?;
        }
        if let Some(take_profit) = self.take_profit {
            settings.take_profit = Decimal::try_from(take_profit).context("Invalid take profit")?;
        }
        if self.trailing_stop {
            settings.trailing_stop = true;
        }
        if let Some(max_trades) = self.max_trades {
            settings.max_trades = max_trades;
        }
        if let Some(time_frame) = &self.time_frame {
            settings.time_frame = time_frame.parse::<TimeFrame>()?;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let service = ServiceConfig {
        data_url: cli.data_url.trim_end_matches('/').to_string(),
        predict_url: cli.predict_url.trim_end_matches('/').to_string(),
        timeout_secs: cli.timeout_secs,
    };

    match cli.command {
        Commands::Run {
            strategy,
            settings,
            auto,
            history_limit,
        } => {
            let strategy: Strategy = strategy.parse()?;
            let settings = settings.resolve()?;

            info!(
                strategy = strategy.as_str(),
                investment = %settings.investment,
                stop_loss = %settings.stop_loss,
                take_profit = %settings.take_profit,
                max_trades = settings.max_trades,
                "Starting trading session"
            );

            let client = PredictionClient::new(service)?;
            let bot_config = BotConfig {
                strategy,
                settings: settings.clone(),
                history_limit,
                auto_start: auto,
                schedule: ScheduleConfig::default(),
            };
            let mut bot = Bot::new(
                bot_config,
                Arc::new(client),
                Box::new(SimulatedPriceFeed::new()),
            )?;

            println!("\n=== Signal Trader ===");
            println!("Strategy:    {}", strategy.display_name());
            println!("Investment:  ${}", settings.investment);
            println!("Stop loss:   {}%  Take profit: {}%", settings.stop_loss, settings.take_profit);
            println!("Max trades:  {}  Time frame: {}", settings.max_trades, settings.time_frame);
            println!("\nCommands: buy, sell, close, auto, status, history [n], set <field> <value>, dismiss, quit");
            println!("Press Ctrl+C to stop.\n");

            bot.run(spawn_console_reader()).await?;
        }

        Commands::Predict { strategy } => {
            let strategy: Strategy = strategy.parse()?;
            let client = PredictionClient::new(service)?;

            let prediction = client.request_prediction(strategy).await?;
            let signal = interpret(strategy, &prediction);

            println!("\nStrategy:   {}", strategy.display_name());
            println!("Prediction: {}", prediction.raw);
            println!("Direction:  {:?}", prediction.direction);
            println!("Signal:     {}", signal);
        }

        Commands::Strategies => {
            println!("\n{:<16} {:<20} {:<26}", "STRATEGY", "NAME", "ENDPOINT");
            println!("{}", "-".repeat(62));
            for strategy in Strategy::ALL {
                println!(
                    "{:<16} {:<20} {:<26}",
                    strategy.as_str(),
                    strategy.display_name(),
                    strategy.endpoint()
                );
                let phrases = strategy.phrases();
                println!("    buy:  {}", phrases.up);
                println!("    sell: {}", phrases.down);
                if let Some(neutral) = phrases.neutral {
                    println!("    hold: {}", neutral);
                }
            }
        }

        Commands::Config { settings } => {
            let settings = settings.resolve()?;

            println!("\n=== Trade Settings ===\n");
            println!("  Investment:           ${}", settings.investment);
            println!("  Stop Loss:            {}%", settings.stop_loss);
            println!("  Take Profit:          {}%", settings.take_profit);
            println!("  Trailing Stop:        {}", settings.trailing_stop);
            println!("  Max Trades:           {}", settings.max_trades);
            println!("  Time Frame:           {}", settings.time_frame);

            let schedule = ScheduleConfig::default();
            println!("\n=== Services ===\n");
            println!("  Data Service:         {}", service.data_url);
            println!("  Prediction Service:   {}", service.predict_url);
            println!("  Request Timeout:      {}s", service.timeout_secs);
            println!("  Decision Interval:    {}s", schedule.decision_period.as_secs());
            println!("  Refresh Interval:     {}s", schedule.refresh_period.as_secs());
            println!("  Price Interval:       {}s", schedule.price_period.as_secs());

            println!("\nSettings JSON:");
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

/// Read operator commands from stdin on a plain thread. A blocking stdin
/// read cannot be cancelled, so it must not hold up runtime shutdown.
fn spawn_console_reader() -> mpsc::Receiver<Command> {
    let (tx, rx) = mpsc::channel(16);

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    if tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                Err(e) => println!("{}", e),
            }
        }
        debug!("Console reader finished");
    });

    rx
}
