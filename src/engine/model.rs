//! Model boundary: trained models, scoring engines and trainers
//!
//! A [`TrainedModel`] is immutable and shared read-only by every engine built
//! from it. A [`ScoringEngine`] carries per-call scratch state and needs
//! `&mut self`, so one engine serves one request at a time.

use serde::{Deserialize, Serialize};

use super::preprocess::{PixelBuffer, Preprocessor};
use crate::dataset::LabelKeyMapper;
use crate::error::{ClassifyError, Result};

/// Input shape and output label keys of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub input_width: u32,
    pub input_height: u32,
    pub channels: u8,
    /// Score index `i` belongs to label key `i`
    pub labels: LabelKeyMapper,
}

impl ModelSchema {
    pub fn preprocessor(&self) -> Preprocessor {
        Preprocessor::new(self.input_width, self.input_height, self.channels == 1)
    }

    /// Check that a buffer has the model's input shape
    pub fn check_input(&self, input: &PixelBuffer) -> Result<()> {
        let expected = (self.input_width, self.input_height, self.channels);
        if input.dimensions() != expected {
            return Err(ClassifyError::DimensionMismatch {
                expected: format!("{}x{}x{}", expected.0, expected.1, expected.2),
                actual: format!("{}x{}x{}", input.width(), input.height(), input.channels()),
            });
        }
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }
}

/// Stateful scorer bound to one model
pub trait ScoringEngine: Send + 'static {
    /// Per-class probabilities, indexed by label key
    fn score(&mut self, input: &PixelBuffer) -> Result<Vec<f32>>;
}

/// Immutable trained artifact that can materialise scoring engines
pub trait TrainedModel: Send + Sync + 'static {
    type Engine: ScoringEngine;

    fn schema(&self) -> &ModelSchema;

    /// Build a scoring-ready engine; may be expensive
    fn create_engine(&self) -> Result<Self::Engine>;
}

/// A preprocessed example with its label key
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub input: PixelBuffer,
    pub key: u32,
}

/// Fits a model to preprocessed examples
pub trait ModelTrainer {
    type Model: TrainedModel;

    /// `labels` is the mapping built over the full dataset; it becomes part of the model schema.
    fn fit(
        &self,
        train: &[TrainingExample],
        labels: &LabelKeyMapper,
        validation: Option<&[TrainingExample]>,
    ) -> Result<Self::Model>;
}
