//! Nearest class-mean classifier
//!
//! Each class is summarised by the mean of its normalised pixel vectors.
//! Scores are a softmax over negative mean-squared distances to each mean,
//! scaled by a temperature. Artifacts are stored as JSON.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::model::{ModelSchema, ModelTrainer, ScoringEngine, TrainedModel, TrainingExample};
use super::preprocess::PixelBuffer;
use crate::dataset::LabelKeyMapper;
use crate::error::{ClassifyError, Result};
use crate::utils::math::{argmax, mean_squared_distance, softmax};

#[derive(Debug, Serialize, Deserialize)]
struct CentroidParams {
    schema: ModelSchema,
    temperature: f32,
    /// Indexed by label key; `None` for classes absent from the training set
    centroids: Vec<Option<Vec<f32>>>,
}

impl CentroidParams {
    /// Reject artifacts whose centroids cannot be scored against the schema
    fn check(&self) -> Result<()> {
        let classes = self.schema.num_classes();
        if classes == 0 {
            return Err(ClassifyError::model("artifact has no labels"));
        }
        if self.centroids.len() != classes {
            return Err(ClassifyError::model(format!(
                "artifact has {} centroids for {} labels",
                self.centroids.len(),
                classes
            )));
        }
        let dim = self.schema.input_width as usize * self.schema.input_height as usize * self.schema.channels as usize;
        for (key, centroid) in self.centroids.iter().enumerate() {
            if let Some(c) = centroid.as_ref().filter(|c| c.len() != dim) {
                return Err(ClassifyError::model(format!(
                    "centroid {} has {} values, expected {}",
                    key,
                    c.len(),
                    dim
                )));
            }
        }
        if !(self.temperature > 0.0) {
            return Err(ClassifyError::model(format!("temperature must be positive, got {}", self.temperature)));
        }
        Ok(())
    }
}

/// Trained nearest-centroid model
#[derive(Debug, Clone)]
pub struct CentroidModel {
    params: Arc<CentroidParams>,
}

impl CentroidModel {
    /// Write the artifact as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer(file, &*self.params)?;
        info!("Model saved to: {:?}", path);
        Ok(())
    }

    /// Read an artifact written by [`save`](Self::save)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading model from: {:?}", path);
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        let params: CentroidParams = serde_json::from_reader(file)?;

        params.check()?;
        Ok(Self {
            params: Arc::new(params),
        })
    }

    pub fn temperature(&self) -> f32 {
        self.params.temperature
    }

    /// Number of classes that received at least one training example
    pub fn trained_classes(&self) -> usize {
        self.params.centroids.iter().filter(|c| c.is_some()).count()
    }
}

impl TrainedModel for CentroidModel {
    type Engine = CentroidEngine;

    fn schema(&self) -> &ModelSchema {
        &self.params.schema
    }

    fn create_engine(&self) -> Result<CentroidEngine> {
        let classes = self.params.centroids.len();
        Ok(CentroidEngine {
            params: Arc::clone(&self.params),
            features: Vec::new(),
            logits: Vec::with_capacity(classes),
        })
    }
}

/// Scoring engine with reusable feature and logit buffers
pub struct CentroidEngine {
    params: Arc<CentroidParams>,
    features: Vec<f32>,
    logits: Vec<f32>,
}

impl ScoringEngine for CentroidEngine {
    fn score(&mut self, input: &PixelBuffer) -> Result<Vec<f32>> {
        self.params.schema.check_input(input)?;

        self.features.clear();
        self.features
            .extend(input.pixels().iter().map(|&p| p as f32 / 255.0));

        let temperature = self.params.temperature;
        self.logits.clear();
        for centroid in &self.params.centroids {
            let logit = match centroid {
                Some(c) => -mean_squared_distance(&self.features, c) / temperature,
                None => f32::NEG_INFINITY,
            };
            self.logits.push(logit);
        }

        Ok(softmax(&self.logits))
    }
}

/// Fits a [`CentroidModel`]
#[derive(Debug, Clone)]
pub struct CentroidTrainer {
    pub temperature: f32,
}

impl Default for CentroidTrainer {
    fn default() -> Self {
        Self { temperature: 0.05 }
    }
}

impl CentroidTrainer {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }
}

impl ModelTrainer for CentroidTrainer {
    type Model = CentroidModel;

    fn fit(
        &self,
        train: &[TrainingExample],
        labels: &LabelKeyMapper,
        validation: Option<&[TrainingExample]>,
    ) -> Result<CentroidModel> {
        let first = train
            .first()
            .ok_or_else(|| ClassifyError::EmptyDataset("no training examples".to_string()))?;
        if !(self.temperature > 0.0) {
            return Err(ClassifyError::InvalidInput(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }

        let start = Instant::now();
        let (width, height, channels) = first.input.dimensions();
        let dim = first.input.pixels().len();

        let mut sums = vec![vec![0f64; dim]; labels.len()];
        let mut counts = vec![0usize; labels.len()];

        for example in train {
            if example.input.dimensions() != (width, height, channels) {
                return Err(ClassifyError::DimensionMismatch {
                    expected: format!("{}x{}x{}", width, height, channels),
                    actual: format!(
                        "{}x{}x{}",
                        example.input.width(),
                        example.input.height(),
                        example.input.channels()
                    ),
                });
            }
            let key = example.key as usize;
            let sum = sums.get_mut(key).ok_or(ClassifyError::UnknownKey(example.key))?;
            for (acc, &p) in sum.iter_mut().zip(example.input.pixels()) {
                *acc += p as f64 / 255.0;
            }
            counts[key] += 1;
        }

        let centroids: Vec<Option<Vec<f32>>> = sums
            .into_iter()
            .zip(&counts)
            .map(|(sum, &count)| {
                (count > 0).then(|| sum.into_iter().map(|s| (s / count as f64) as f32).collect())
            })
            .collect();

        let model = CentroidModel {
            params: Arc::new(CentroidParams {
                schema: ModelSchema {
                    input_width: width,
                    input_height: height,
                    channels,
                    labels: labels.clone(),
                },
                temperature: self.temperature,
                centroids,
            }),
        };

        info!(
            "Fitted {} of {} classes on {} examples in {:?}",
            model.trained_classes(),
            labels.len(),
            train.len(),
            start.elapsed()
        );

        if let Some(validation) = validation.filter(|v| !v.is_empty()) {
            let mut engine = model.create_engine()?;
            let mut correct = 0usize;
            for example in validation {
                let scores = engine.score(&example.input)?;
                if argmax(&scores).map(|(idx, _)| idx as u32) == Some(example.key) {
                    correct += 1;
                }
            }
            info!(
                "Validation accuracy: {:.4} ({} / {})",
                correct as f64 / validation.len() as f64,
                correct,
                validation.len()
            );
        }

        Ok(model)
    }
}
