//! Multi-class classification metrics
//!
//! Computes, from per-class probability vectors and true label keys:
//! - Micro accuracy (correct / total)
//! - Macro accuracy (mean per-class recall over classes present in the truth)
//! - Log-loss and per-class log-loss, with probabilities clamped to `LOG_LOSS_EPSILON`
//! - Log-loss reduction relative to the label prior
//! - Confusion matrix

use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, Result};
use crate::utils::math::argmax;

/// Probabilities are clamped to at least this value before taking the logarithm
pub const LOG_LOSS_EPSILON: f64 = 1e-15;

/// Evaluation result for one test partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticlassMetrics {
    pub total_samples: usize,
    pub correct_predictions: usize,
    pub micro_accuracy: f64,
    pub macro_accuracy: f64,
    pub log_loss: f64,
    /// `1 - log_loss / prior_log_loss`; 0 when the prior carries no information
    pub log_loss_reduction: f64,
    /// Indexed by label key; 0 for classes absent from the truth
    pub per_class_log_loss: Vec<f64>,
    pub confusion_matrix: ConfusionMatrix,
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    /// Row = actual, column = predicted; row-major
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    pub fn add(&mut self, actual: usize, predicted: usize) {
        self.matrix[actual * self.num_classes + predicted] += 1;
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.matrix[actual * self.num_classes + predicted]
    }

    /// Number of samples whose true class is `class`
    pub fn support(&self, class: usize) -> usize {
        let start = class * self.num_classes;
        self.matrix[start..start + self.num_classes].iter().sum()
    }

    /// TP / support; `None` for classes without support
    pub fn recall(&self, class: usize) -> Option<f64> {
        let support = self.support(class);
        (support > 0).then(|| self.get(class, class) as f64 / support as f64)
    }

    /// TP / predicted count; `None` when the class was never predicted
    pub fn precision(&self, class: usize) -> Option<f64> {
        let predicted: usize = (0..self.num_classes).map(|a| self.get(a, class)).sum();
        (predicted > 0).then(|| self.get(class, class) as f64 / predicted as f64)
    }
}

/// Score a test partition.
///
/// `scores[i]` is the probability vector for sample `i`, indexed by label key;
/// `truth[i]` its true key. Every score vector must have `num_classes` entries.
pub fn evaluate(scores: &[Vec<f32>], truth: &[u32], num_classes: usize) -> Result<MulticlassMetrics> {
    if scores.len() != truth.len() {
        return Err(ClassifyError::InvalidInput(format!(
            "{} score vectors for {} ground-truth keys",
            scores.len(),
            truth.len()
        )));
    }
    if scores.is_empty() {
        return Err(ClassifyError::EmptyDataset("nothing to evaluate".to_string()));
    }

    let mut confusion = ConfusionMatrix::new(num_classes);
    let mut class_loss_sum = vec![0f64; num_classes];
    let mut loss_sum = 0f64;
    let mut correct = 0usize;

    for (probs, &key) in scores.iter().zip(truth) {
        if probs.len() != num_classes {
            return Err(ClassifyError::DimensionMismatch {
                expected: format!("{} scores", num_classes),
                actual: format!("{} scores", probs.len()),
            });
        }
        let actual = key as usize;
        if actual >= num_classes {
            return Err(ClassifyError::UnknownKey(key));
        }

        let (predicted, _) = argmax(probs).ok_or_else(|| {
            ClassifyError::InvalidInput("score vector has no comparable entries".to_string())
        })?;
        confusion.add(actual, predicted);
        if predicted == actual {
            correct += 1;
        }

        let p = (probs[actual] as f64).max(LOG_LOSS_EPSILON);
        let loss = -p.ln();
        loss_sum += loss;
        class_loss_sum[actual] += loss;
    }

    let total = scores.len();
    let log_loss = loss_sum / total as f64;

    let per_class_log_loss: Vec<f64> = class_loss_sum
        .iter()
        .enumerate()
        .map(|(class, &sum)| match confusion.support(class) {
            0 => 0.0,
            support => sum / support as f64,
        })
        .collect();

    let recalls: Vec<f64> = (0..num_classes).filter_map(|c| confusion.recall(c)).collect();
    let macro_accuracy = recalls.iter().sum::<f64>() / recalls.len() as f64;

    let prior = prior_log_loss(&confusion, total);
    let log_loss_reduction = if prior > 0.0 {
        1.0 - log_loss / prior
    } else {
        0.0
    };

    Ok(MulticlassMetrics {
        total_samples: total,
        correct_predictions: correct,
        micro_accuracy: correct as f64 / total as f64,
        macro_accuracy,
        log_loss,
        log_loss_reduction,
        per_class_log_loss,
        confusion_matrix: confusion,
    })
}

/// Log-loss of always predicting the empirical class distribution
fn prior_log_loss(confusion: &ConfusionMatrix, total: usize) -> f64 {
    (0..confusion.num_classes)
        .map(|c| confusion.support(c) as f64 / total as f64)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.ln())
        .sum()
}
