//! Cancellable periodic tasks driving the bot loop.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Periodic work the bot performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Auto-trading decision cycle
    DecisionCycle,
    /// Background prediction refresh while auto trading
    PredictionRefresh,
    /// Market price refresh for display and best-price tracking
    PriceRefresh,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::DecisionCycle => "decision_cycle",
            TaskKind::PredictionRefresh => "prediction_refresh",
            TaskKind::PriceRefresh => "price_refresh",
        }
    }
}

/// Task periods.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub decision_period: Duration,
    pub refresh_period: Duration,
    pub price_period: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            decision_period: Duration::from_secs(5),
            refresh_period: Duration::from_secs(15),
            price_period: Duration::from_secs(3),
        }
    }
}

/// A timer that can be started and stopped. A stopped task never fires.
#[derive(Debug)]
pub struct PeriodicTask {
    kind: TaskKind,
    period: Duration,
    interval: Option<Interval>,
}

impl PeriodicTask {
    pub fn new(kind: TaskKind, period: Duration) -> Self {
        Self {
            kind,
            period,
            interval: None,
        }
    }

    /// Start the timer; the first tick fires one period from now.
    pub fn start(&mut self) {
        if self.interval.is_some() {
            return;
        }
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        debug!(task = self.kind.as_str(), period_ms = self.period.as_millis() as u64, "Task started");
    }

    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            debug!(task = self.kind.as_str(), "Task stopped");
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick. Pends forever while stopped.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// The bot's three periodic tasks.
#[derive(Debug)]
pub struct Scheduler {
    decision: PeriodicTask,
    refresh: PeriodicTask,
    price: PeriodicTask,
}

impl Scheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self {
            decision: PeriodicTask::new(TaskKind::DecisionCycle, config.decision_period),
            refresh: PeriodicTask::new(TaskKind::PredictionRefresh, config.refresh_period),
            price: PeriodicTask::new(TaskKind::PriceRefresh, config.price_period),
        }
    }

    fn task_mut(&mut self, kind: TaskKind) -> &mut PeriodicTask {
        match kind {
            TaskKind::DecisionCycle => &mut self.decision,
            TaskKind::PredictionRefresh => &mut self.refresh,
            TaskKind::PriceRefresh => &mut self.price,
        }
    }

    pub fn start(&mut self, kind: TaskKind) {
        self.task_mut(kind).start();
    }

    #[cfg(test)]
    pub fn is_running(&self, kind: TaskKind) -> bool {
        match kind {
            TaskKind::DecisionCycle => self.decision.is_running(),
            TaskKind::PredictionRefresh => self.refresh.is_running(),
            TaskKind::PriceRefresh => self.price.is_running(),
        }
    }

    /// Run the decision and refresh tasks only while auto trading.
    pub fn set_auto_trading(&mut self, enabled: bool) {
        if enabled {
            self.decision.start();
            self.refresh.start();
        } else {
            self.decision.stop();
            self.refresh.stop();
        }
    }

    pub fn stop_all(&mut self) {
        self.decision.stop();
        self.refresh.stop();
        self.price.stop();
    }

    /// Wait for whichever running task fires next.
    pub async fn next(&mut self) -> TaskKind {
        tokio::select! {
            _ = self.decision.tick() => TaskKind::DecisionCycle,
            _ = self.refresh.tick() => TaskKind::PredictionRefresh,
            _ = self.price.tick() => TaskKind::PriceRefresh,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(ScheduleConfig::default())
    }
}
