//! HTTP client for the data-refresh and prediction services.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{Prediction, Strategy};

use super::types::{FileStatusResponse, MessageResponse};
use super::PredictionSource;

const DATA_API_BASE: &str = "http://localhost:5000";
const PREDICT_API_BASE: &str = "http://localhost:5001";
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Where the external services live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the file-status / data-refresh service
    pub data_url: String,

    /// Base URL of the prediction service
    pub predict_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_url: DATA_API_BASE.to_string(),
            predict_url: PREDICT_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Client for the prediction boundary.
pub struct PredictionClient {
    client: Client,
    config: ServiceConfig,
}

impl PredictionClient {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// Point both services at the same base URL.
    #[cfg(test)]
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Self::new(ServiceConfig {
            data_url: base_url.to_string(),
            predict_url: base_url.to_string(),
            ..ServiceConfig::default()
        })
    }

    /// Check whether the market data file exists.
    pub async fn check_file(&self) -> Result<FileStatusResponse> {
        let url = format!("{}/api/check-file", self.config.data_url);
        self.get_json(&url, "check-file").await
    }

    /// Ask the data service to refresh its market data.
    pub async fn refresh_data(&self) -> Result<MessageResponse> {
        let url = format!("{}/api/fetch-data", self.config.data_url);
        self.get_json(&url, "fetch-data").await
    }

    /// Make sure data exists, then fetch the strategy's prediction.
    pub async fn request_prediction(&self, strategy: Strategy) -> Result<Prediction> {
        let status = self.check_file().await?;
        if !status.exists {
            info!(message = %status.message, "Market data missing, requesting refresh");
            // The prediction request proceeds whatever the refresh returns
            match self.refresh_data().await {
                Ok(response) => debug!(message = %response.message, "Data refresh finished"),
                Err(e) => warn!(error = %e, "Data refresh failed"),
            }
        }

        let url = format!("{}{}", self.config.predict_url, strategy.endpoint());
        let response: MessageResponse = self.get_json(&url, strategy.as_str()).await?;

        debug!(strategy = strategy.as_str(), message = %response.message, "Prediction received");
        Ok(Prediction::parse(strategy, response.message))
    }

    /// GET and decode a JSON body. Client errors still carry a readable
    /// body and are decoded; server errors are failures.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        debug!(url = %url, "Requesting {}", what);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", what))?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} request failed: {} - {}", what, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }
}

#[async_trait]
impl PredictionSource for PredictionClient {
    async fn fetch_prediction(&self, strategy: Strategy) -> Option<Prediction> {
        match self.request_prediction(strategy).await {
            Ok(prediction) => Some(prediction),
            Err(e) => {
                warn!(strategy = strategy.as_str(), error = %e, "Prediction fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;

    fn mock_json(server: &mut mockito::Server, path: &str, status: usize, body: &str) -> mockito::Mock {
        server
            .mock("GET", path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    #[tokio::test]
    async fn test_fetches_prediction_when_data_exists() {
        let mut server = mockito::Server::new_async().await;
        let check = mock_json(&mut server, "/api/check-file", 200, r#"{"exists": true, "message": "ok"}"#)
            .create_async()
            .await;
        let refresh = mock_json(&mut server, "/api/fetch-data", 200, r#"{"message": "done"}"#)
            .expect(0)
            .create_async()
            .await;
        let predict = mock_json(
            &mut server,
            "/api/predict-macd",
            200,
            r#"{"message": "📈 MACD Uptrend (Buy)", "macd": 0.42}"#,
        )
        .create_async()
        .await;

        let client = PredictionClient::with_base_url(&server.url()).unwrap();
        let prediction = client.fetch_prediction(Strategy::Macd).await.unwrap();

        assert_eq!(prediction.strategy, Strategy::Macd);
        assert_eq!(prediction.direction, Direction::Up);
        check.assert_async().await;
        refresh.assert_async().await;
        predict.assert_async().await;
    }

    #[tokio::test]
    async fn test_refreshes_missing_data_first() {
        let mut server = mockito::Server::new_async().await;
        let _check = mock_json(&mut server, "/api/check-file", 200, r#"{"exists": false, "message": "missing"}"#)
            .create_async()
            .await;
        let refresh = mock_json(&mut server, "/api/fetch-data", 200, r#"{"message": "Data fetched"}"#)
            .create_async()
            .await;
        let _predict = mock_json(&mut server, "/api/predict", 200, r#"{"message": "📉 Downtrend (Sell)"}"#)
            .create_async()
            .await;

        let client = PredictionClient::with_base_url(&server.url()).unwrap();
        let prediction = client.fetch_prediction(Strategy::MovingAverage).await.unwrap();

        assert_eq!(prediction.direction, Direction::Down);
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_block_prediction() {
        let mut server = mockito::Server::new_async().await;
        let _check = mock_json(&mut server, "/api/check-file", 200, r#"{"exists": false}"#)
            .create_async()
            .await;
        let _refresh = mock_json(&mut server, "/api/fetch-data", 503, r#"{"message": "down"}"#)
            .create_async()
            .await;
        let _predict = mock_json(
            &mut server,
            "/api/predict-sentiment",
            200,
            r#"{"message": "📈 Positive Sentiment (Buy)"}"#,
        )
        .create_async()
        .await;

        let client = PredictionClient::with_base_url(&server.url()).unwrap();
        let prediction = client.fetch_prediction(Strategy::Sentiment).await.unwrap();
        assert_eq!(prediction.direction, Direction::Up);
    }

    #[tokio::test]
    async fn test_client_error_body_is_unrecognized() {
        let mut server = mockito::Server::new_async().await;
        let _check = mock_json(&mut server, "/api/check-file", 200, r#"{"exists": true}"#)
            .create_async()
            .await;
        let _predict = mock_json(
            &mut server,
            "/api/predict-momentum",
            400,
            r#"{"message": "⚠️ Not enough stock data to make a prediction"}"#,
        )
        .create_async()
        .await;

        let client = PredictionClient::with_base_url(&server.url()).unwrap();
        let prediction = client.fetch_prediction(Strategy::Momentum).await.unwrap();
        assert_eq!(prediction.direction, Direction::Unrecognized);
    }

    #[tokio::test]
    async fn test_server_error_yields_none() {
        let mut server = mockito::Server::new_async().await;
        let _check = mock_json(&mut server, "/api/check-file", 200, r#"{"exists": true}"#)
            .create_async()
            .await;
        let _predict = mock_json(&mut server, "/api/predict-transformer", 500, r#"{"error": "boom"}"#)
            .create_async()
            .await;

        let client = PredictionClient::with_base_url(&server.url()).unwrap();
        assert!(client.fetch_prediction(Strategy::Transformer).await.is_none());
    }

    #[tokio::test]
    async fn test_check_file_failure_yields_none() {
        let mut server = mockito::Server::new_async().await;
        let _check = mock_json(&mut server, "/api/check-file", 500, "")
            .create_async()
            .await;
        let predict = mock_json(&mut server, "/api/predict", 200, r#"{"message": "📈 Uptrend (Buy)"}"#)
            .expect(0)
            .create_async()
            .await;

        let client = PredictionClient::with_base_url(&server.url()).unwrap();
        assert!(client.fetch_prediction(Strategy::MovingAverage).await.is_none());
        predict.assert_async().await;
    }

    #[tokio::test]
    async fn test_undecodable_body_yields_none() {
        let mut server = mockito::Server::new_async().await;
        let _check = mock_json(&mut server, "/api/check-file", 200, r#"{"exists": true}"#)
            .create_async()
            .await;
        let _predict = mock_json(&mut server, "/api/predict", 200, "not json")
            .create_async()
            .await;

        let client = PredictionClient::with_base_url(&server.url()).unwrap();
        assert!(client.fetch_prediction(Strategy::MovingAverage).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_yields_none() {
        let client = PredictionClient::new(ServiceConfig {
            data_url: "http://127.0.0.1:1".to_string(),
            predict_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 1,
        })
        .unwrap();
        assert!(client.fetch_prediction(Strategy::MovingAverage).await.is_none());
    }

    #[tokio::test]
    async fn test_silent_service_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        // Accept connections and hold them open without ever answering
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = PredictionClient::new(ServiceConfig {
            data_url: base.clone(),
            predict_url: base,
            timeout_secs: 1,
        })
        .unwrap();

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            client.fetch_prediction(Strategy::Momentum),
        )
        .await;

        assert!(matches!(result, Ok(None)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
