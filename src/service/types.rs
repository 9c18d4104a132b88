//! Service layer types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::evaluation::{FoldSummary, MulticlassMetrics};

/// Probability assigned to one label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Outcome of classifying one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub image_id: String,
    pub predicted_label: String,
    /// Probability of the predicted label
    pub probability: f32,
    /// Every label with its probability, highest first
    pub scores: Vec<LabelScore>,
    /// Validation, preprocessing and scoring, end to end
    pub execution_time_ms: u64,
    /// Time spent waiting for and running the engine
    pub inference_time_ms: u64,
}

/// Result of one train-and-evaluate run
#[derive(Debug)]
pub struct TrainingReport<M> {
    pub model: M,
    pub metrics: MulticlassMetrics,
    pub train_count: usize,
    pub test_count: usize,
    /// Images dropped because they could not be preprocessed
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Result of k-fold cross-validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub folds: Vec<MulticlassMetrics>,
    pub summary: FoldSummary,
    pub skipped: usize,
}
