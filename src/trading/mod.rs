//! Trading logic: signal interpretation, position lifecycle, risk rules,
//! ledger and notifications.

mod config;
mod ledger;
mod notifier;
mod risk;
mod session;
mod signal;

pub use config::{TimeFrame, TradeSettings};
pub use ledger::DEFAULT_RETENTION;
pub use session::{CycleOutcome, TradingSession};
pub use signal::interpret;
