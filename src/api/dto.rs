//! REST API request/response data transfer objects

use serde::Serialize;

use crate::engine::PoolStats;
use crate::service::{LabelScore, PredictionSummary};

/// Classification response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyResponse {
    pub image_id: String,
    pub predicted_label: String,
    pub probability: f32,
    /// Milliseconds spent validating, preprocessing and scoring
    pub prediction_execution_time: u64,
    pub scores: Vec<LabelScore>,
}

impl From<PredictionSummary> for ClassifyResponse {
    fn from(summary: PredictionSummary) -> Self {
        Self {
            image_id: summary.image_id,
            predicted_label: summary.predicted_label,
            probability: summary.probability,
            prediction_execution_time: summary.execution_time_ms,
            scores: summary.scores,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub labels: Vec<String>,
    pub pool: PoolStats,
    pub uptime_seconds: u64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}
