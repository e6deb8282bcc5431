//! Calculator for session performance metrics: win rate, profit factor, drawdown.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use statrs::statistics::Statistics;

use crate::models::{SessionMetrics, TradeRecord};

/// Calculator for computing session performance metrics.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate metrics from ledger records, newest first as the ledger
    /// yields them. Only CLOSE records carry a realized profit.
    pub fn calculate<'a, I>(records: I) -> SessionMetrics
    where
        I: IntoIterator<Item = &'a TradeRecord>,
    {
        let mut pnls: Vec<Decimal> = records
            .into_iter()
            .filter(|r| r.is_close())
            .filter_map(|r| r.profit)
            .collect();
        // Oldest first for the equity curve
        pnls.reverse();

        Self::from_pnls(&pnls)
    }

    /// Calculate metrics from realized profits in chronological order.
    pub fn from_pnls(pnls: &[Decimal]) -> SessionMetrics {
        let mut metrics = SessionMetrics::new();

        if pnls.is_empty() {
            return metrics;
        }

        metrics.closed_trades = pnls.len() as u32;
        Self::calculate_pnl_metrics(&mut metrics, pnls);
        Self::calculate_drawdown(&mut metrics, pnls);
        Self::calculate_dispersion(&mut metrics, pnls);

        metrics.calculated_at = Utc::now();
        metrics
    }

    fn calculate_pnl_metrics(metrics: &mut SessionMetrics, pnls: &[Decimal]) {
        let (wins, losses): (Vec<Decimal>, Vec<Decimal>) =
            pnls.iter().copied().partition(|p| *p > Decimal::ZERO);

        metrics.winning_trades = wins.len() as u32;
        metrics.losing_trades = losses.iter().filter(|l| **l < Decimal::ZERO).count() as u32;
        metrics.total_pnl = pnls.iter().copied().sum();
        metrics.win_rate = wins.len() as f64 / pnls.len() as f64;

        if !wins.is_empty() {
            metrics.avg_win = wins.iter().copied().sum::<Decimal>() / Decimal::from(wins.len() as u32);
        }
        if metrics.losing_trades > 0 {
            metrics.avg_loss = losses.iter().map(|l| l.abs()).sum::<Decimal>()
                / Decimal::from(metrics.losing_trades);
        }

        let gross_profit: Decimal = wins.iter().copied().sum();
        let gross_loss: Decimal = losses.iter().map(|l| l.abs()).sum();
        if gross_loss > Decimal::ZERO {
            metrics.profit_factor =
                gross_profit.to_f64().unwrap_or(0.0) / gross_loss.to_f64().unwrap_or(1.0);
        }

        metrics.expectancy = metrics.total_pnl / Decimal::from(pnls.len() as u32);
        metrics.best_trade = pnls.iter().copied().max().unwrap_or(Decimal::ZERO);
        metrics.worst_trade = pnls.iter().copied().min().unwrap_or(Decimal::ZERO);
    }

    /// Maximum peak-to-trough decline of cumulative realized P&L.
    fn calculate_drawdown(metrics: &mut SessionMetrics, pnls: &[Decimal]) {
        let mut equity = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        let mut max_dd = Decimal::ZERO;

        for pnl in pnls {
            equity += pnl;
            if equity > peak {
                peak = equity;
            }
            let dd = peak - equity;
            if dd > max_dd {
                max_dd = dd;
            }
        }

        metrics.max_drawdown = max_dd;
    }

    fn calculate_dispersion(metrics: &mut SessionMetrics, pnls: &[Decimal]) {
        if pnls.len() < 2 {
            return;
        }

        let values: Vec<f64> = pnls.iter().filter_map(|p| p.to_f64()).collect();
        let std_dev = values.std_dev();
        if std_dev.is_finite() {
            metrics.pnl_std_dev = std_dev;
        }
    }
}
