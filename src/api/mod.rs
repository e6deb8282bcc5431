//! Boundary to the external data and prediction services.

mod prediction_client;
mod types;

use async_trait::async_trait;

use crate::models::{Prediction, Strategy};

pub use prediction_client::{PredictionClient, ServiceConfig};

/// Anything that can produce the latest prediction for a strategy.
///
/// Failures never surface as errors: implementations log them and return
/// `None`, leaving the caller's cached prediction untouched.
#[async_trait]
pub trait PredictionSource: Send + Sync {
    async fn fetch_prediction(&self, strategy: Strategy) -> Option<Prediction>;
}
