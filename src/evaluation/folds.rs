//! Cross-fold aggregation of evaluation metrics

use serde::{Deserialize, Serialize};

use super::metrics::MulticlassMetrics;
use crate::error::{ClassifyError, Result};
use crate::utils::math::{mean, sample_std_dev};

/// z-score for a two-sided 95% interval
const Z_95: f64 = 1.96;

/// Spread of one scalar metric across folds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator)
    pub std_dev: f64,
    /// `1.96 * std_dev / sqrt(n - 1)`
    pub ci95: f64,
}

impl MetricStatistics {
    /// Statistics over at least two values
    pub fn from_values(values: &[f64]) -> Result<Self> {
        let n = values.len();
        let (Some(avg), Some(std_dev)) = (mean(values), sample_std_dev(values)) else {
            return Err(ClassifyError::InsufficientFolds(n));
        };
        Ok(Self {
            mean: avg,
            std_dev,
            ci95: Z_95 * std_dev / ((n - 1) as f64).sqrt(),
        })
    }
}

/// Per-metric statistics across cross-validation folds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldSummary {
    pub folds: usize,
    pub micro_accuracy: MetricStatistics,
    pub macro_accuracy: MetricStatistics,
    pub log_loss: MetricStatistics,
    pub log_loss_reduction: MetricStatistics,
}

/// Aggregate fold metrics; fails with `InsufficientFolds` below two folds
pub fn fold_aggregate(folds: &[MulticlassMetrics]) -> Result<FoldSummary> {
    if folds.len() < 2 {
        return Err(ClassifyError::InsufficientFolds(folds.len()));
    }
    let stat = |f: fn(&MulticlassMetrics) -> f64| {
        let values: Vec<f64> = folds.iter().map(f).collect();
        MetricStatistics::from_values(&values)
    };

    Ok(FoldSummary {
        folds: folds.len(),
        micro_accuracy: stat(|m| m.micro_accuracy)?,
        macro_accuracy: stat(|m| m.macro_accuracy)?,
        log_loss: stat(|m| m.log_loss)?,
        log_loss_reduction: stat(|m| m.log_loss_reduction)?,
    })
}
