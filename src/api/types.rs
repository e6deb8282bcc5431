//! Response types for the data and prediction services.

use serde::{Deserialize, Serialize};

/// Response from `/api/check-file`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileStatusResponse {
    pub exists: bool,
    #[serde(default)]
    pub message: String,
}

/// Response from `/api/fetch-data` and every `/api/predict*` endpoint.
/// Prediction services may attach extra fields; only `message` is read.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
