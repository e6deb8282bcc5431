//! Append-only trade ledger, newest first.

use std::collections::VecDeque;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::models::{Strategy, TradeAction, TradeRecord, TradeSide};

/// Default number of records kept in memory.
pub const DEFAULT_RETENTION: usize = 500;

/// Fields of a ledger entry before the ledger assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub action: TradeAction,
    pub side: TradeSide,
    pub price: Decimal,
    pub quantity: u64,
    pub profit: Option<Decimal>,
    pub reason: String,
    pub strategy: Strategy,
}

/// Trade history bounded by a retention count. Records are never edited;
/// once retention is exceeded the oldest record falls off.
#[derive(Debug, Clone)]
pub struct TradeLedger {
    records: VecDeque<TradeRecord>,
    retention: usize,
    next_id: u64,
}

impl TradeLedger {
    pub fn new(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            records: VecDeque::with_capacity(retention.min(DEFAULT_RETENTION)),
            retention,
            next_id: 1,
        }
    }

    /// Append a record at the head and return it.
    pub fn record(&mut self, entry: LedgerEntry) -> &TradeRecord {
        let record = TradeRecord {
            id: self.next_id,
            action: entry.action,
            side: entry.side,
            price: entry.price,
            quantity: entry.quantity,
            profit: match entry.action {
                TradeAction::Close => entry.profit,
                TradeAction::Open => None,
            },
            timestamp: Utc::now(),
            reason: entry.reason,
            strategy: entry.strategy,
        };
        self.next_id += 1;

        self.records.push_front(record);
        if self.records.len() > self.retention {
            self.records.pop_back();
        }

        &self.records[0]
    }

    /// Records, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter()
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&TradeRecord> {
        self.records.front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records written over the ledger's lifetime, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.next_id - 1
    }

    /// Sum of realized profit over retained CLOSE records.
    pub fn realized_pnl(&self) -> Decimal {
        self.records.iter().filter_map(|r| r.profit).sum()
    }
}

impl Default for TradeLedger {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}
