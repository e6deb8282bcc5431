//! Simulated market price source.

use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

/// Baseline the simulated price oscillates around.
pub const BASELINE_PRICE: Decimal = dec!(100.25);

/// Maximum absolute noise applied to the baseline.
const NOISE_SPREAD: f64 = 2.5;

/// Supplies the current market price. Sampling never fails; implementations
/// fall back to the last known price.
pub trait PriceSource: Send {
    /// Sample a fresh price and remember it.
    fn current_price(&mut self) -> Decimal;

    /// The most recently sampled price.
    fn last_price(&self) -> Decimal;
}

/// Baseline price perturbed by bounded uniform noise.
pub struct SimulatedPriceFeed {
    baseline: Decimal,
    spread: f64,
    last: Decimal,
}

impl SimulatedPriceFeed {
    pub fn new() -> Self {
        Self::with_baseline(BASELINE_PRICE, NOISE_SPREAD)
    }

    pub fn with_baseline(baseline: Decimal, spread: f64) -> Self {
        Self {
            baseline,
            spread: spread.abs(),
            last: baseline,
        }
    }

    fn sample(&self) -> Option<Decimal> {
        if self.spread == 0.0 {
            return Some(self.baseline);
        }
        let noise: f64 = rand::rng().random_range(-self.spread..self.spread);
        let noise = Decimal::try_from(noise).ok()?;
        Some((self.baseline + noise).round_dp(4))
    }
}

impl Default for SimulatedPriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceSource for SimulatedPriceFeed {
    fn current_price(&mut self) -> Decimal {
        match self.sample() {
            Some(price) => {
                debug!(price = %price, "Sampled market price");
                self.last = price;
                price
            }
            None => {
                warn!(last = %self.last, "Price sample failed, using last known price");
                self.last
            }
        }
    }

    fn last_price(&self) -> Decimal {
        self.last
    }
}

/// Replays a fixed sequence of prices, repeating the final one.
#[cfg(test)]
pub struct ScriptedPriceFeed {
    prices: std::collections::VecDeque<Decimal>,
    last: Decimal,
}

#[cfg(test)]
impl ScriptedPriceFeed {
    pub fn new(prices: &[Decimal]) -> Self {
        let last = prices.first().copied().unwrap_or(BASELINE_PRICE);
        Self {
            prices: prices.iter().copied().collect(),
            last,
        }
    }
}

#[cfg(test)]
impl PriceSource for ScriptedPriceFeed {
    fn current_price(&mut self) -> Decimal {
        if let Some(price) = self.prices.pop_front() {
            self.last = price;
        }
        self.last
    }

    fn last_price(&self) -> Decimal {
        self.last
    }
}
