//! Session performance metrics derived from closed trades.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Performance summary of a trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// When these metrics were calculated
    pub calculated_at: DateTime<Utc>,

    // === Basic Statistics ===
    /// Number of closed trades considered
    pub closed_trades: u32,

    /// Total realized P&L
    pub total_pnl: Decimal,

    // === Win/Loss Metrics ===
    pub winning_trades: u32,

    pub losing_trades: u32,

    /// Win rate (0.0 to 1.0)
    pub win_rate: f64,

    /// Average profit on winning trades
    pub avg_win: Decimal,

    /// Average loss on losing trades (absolute value)
    pub avg_loss: Decimal,

    /// Profit factor (gross profit / gross loss)
    pub profit_factor: f64,

    /// Expectancy per trade
    pub expectancy: Decimal,

    pub best_trade: Decimal,

    pub worst_trade: Decimal,

    /// Standard deviation of per-trade profit
    pub pnl_std_dev: f64,

    /// Peak-to-trough decline of cumulative realized P&L
    pub max_drawdown: Decimal,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            calculated_at: Utc::now(),
            closed_trades: 0,
            total_pnl: Decimal::ZERO,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            profit_factor: 0.0,
            expectancy: Decimal::ZERO,
            best_trade: Decimal::ZERO,
            worst_trade: Decimal::ZERO,
            pnl_std_dev: 0.0,
            max_drawdown: Decimal::ZERO,
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Closed Trades:  {} (W {} / L {})",
            self.closed_trades, self.winning_trades, self.losing_trades)?;
        writeln!(f, "Win Rate:       {:.1}%", self.win_rate * 100.0)?;
        writeln!(f, "Realized P&L:   ${:.2}", self.total_pnl)?;
        writeln!(f, "Avg Win:        ${:.2}", self.avg_win)?;
        writeln!(f, "Avg Loss:       ${:.2}", self.avg_loss)?;
        writeln!(f, "Profit Factor:  {:.2}", self.profit_factor)?;
        writeln!(f, "Expectancy:     ${:.2}", self.expectancy)?;
        writeln!(f, "Best / Worst:   ${:.2} / ${:.2}", self.best_trade, self.worst_trade)?;
        writeln!(f, "P&L Std Dev:    {:.2}", self.pnl_std_dev)?;
        write!(f, "Max Drawdown:   ${:.2}", self.max_drawdown.max(dec!(0)))
    }
}
