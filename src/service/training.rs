//! Training pipeline
//!
//! scan → label keys → split → preprocess → fit → evaluate.
//! The label key mapping is built once over every scanned record and reused
//! unchanged for training, evaluation, every cross-validation fold and the
//! saved model.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::{DatasetConfig, ModelConfig};
use crate::dataset::split::validate_fraction;
use crate::dataset::{k_fold, split, DatasetScanner, ImageRecord, LabelKeyMapper};
use crate::engine::{ModelTrainer, Preprocessor, ScoringEngine, TrainedModel, TrainingExample};
use crate::error::{ClassifyError, Result};
use crate::evaluation::{evaluate, fold_aggregate, MulticlassMetrics};

use super::types::{CrossValidationReport, TrainingReport};

/// Examples scored per engine during evaluation
const EVAL_CHUNK: usize = 64;

/// Offline training and evaluation over a dataset folder
pub struct TrainingPipeline<T: ModelTrainer> {
    trainer: T,
    dataset: DatasetConfig,
    preprocessor: Preprocessor,
}

impl<T: ModelTrainer> TrainingPipeline<T> {
    pub fn new(trainer: T, dataset: DatasetConfig, model: &ModelConfig) -> Self {
        let preprocessor = Preprocessor::new(model.input_width, model.input_height, dataset.grayscale);
        Self {
            trainer,
            dataset,
            preprocessor,
        }
    }

    /// Scan the dataset root; an empty result is an error
    pub fn scan(&self) -> Result<Vec<ImageRecord>> {
        let records = DatasetScanner::from_config(&self.dataset).scan()?;
        if records.is_empty() {
            return Err(ClassifyError::EmptyDataset(format!(
                "no JPEG or PNG images under {:?}",
                self.dataset.root
            )));
        }
        Ok(records)
    }

    /// Label keys over every record, before any split
    pub fn build_labels(&self, records: &[ImageRecord]) -> LabelKeyMapper {
        let labels = LabelKeyMapper::build(records.iter().map(|r| &r.label), self.dataset.key_ordinality);
        info!("Label keys: {:?}", labels.labels());
        labels
    }

    /// Preprocess records in parallel; returns the examples and the number skipped
    pub fn prepare(&self, records: &[ImageRecord], labels: &LabelKeyMapper) -> Result<(Vec<TrainingExample>, usize)> {
        let preprocessor = self.preprocessor;
        let prepared: Vec<Option<TrainingExample>> = records
            .par_iter()
            .map(|record| {
                let key = labels.to_key(&record.label)?;
                match preprocessor.prepare_source(&record.source) {
                    Ok(input) => Ok(Some(TrainingExample { input, key })),
                    Err(e) => {
                        warn!("Skipping {:?}: {}", record.source.path(), e);
                        Ok(None)
                    }
                }
            })
            .collect::<Result<_>>()?;

        let total = prepared.len();
        let examples: Vec<TrainingExample> = prepared.into_iter().flatten().collect();
        let skipped = total - examples.len();
        Ok((examples, skipped))
    }

    /// Train on one split of the dataset and evaluate on the held-out part
    pub fn run(&self) -> Result<TrainingReport<T::Model>> {
        validate_fraction(self.dataset.test_fraction)?;
        let start = Instant::now();

        let records = self.scan()?;
        let labels = self.build_labels(&records);

        let parts = split(records, self.dataset.test_fraction, self.dataset.seed)?;
        info!("Train: {} images, test: {} images", parts.train.len(), parts.test.len());

        let (train, skipped_train) = self.prepare(&parts.train, &labels)?;
        let (test, skipped_test) = self.prepare(&parts.test, &labels)?;
        if test.is_empty() {
            return Err(ClassifyError::EmptyDataset(
                "test partition is empty; add images or raise test_fraction".to_string(),
            ));
        }

        info!("Fitting model on {} examples", train.len());
        let model = self.trainer.fit(&train, &labels, Some(&test))?;
        let metrics = evaluate_model(&model, &test)?;

        let elapsed = start.elapsed();
        info!("Training finished in {:?}", elapsed);

        Ok(TrainingReport {
            model,
            metrics,
            train_count: train.len(),
            test_count: test.len(),
            skipped: skipped_train + skipped_test,
            elapsed,
        })
    }

    /// k-fold cross-validation with one shared label mapping
    pub fn cross_validate(&self, k: usize) -> Result<CrossValidationReport> {
        if k < 2 {
            return Err(ClassifyError::InsufficientFolds(k));
        }

        let records = self.scan()?;
        let labels = self.build_labels(&records);
        let (examples, skipped) = self.prepare(&records, &labels)?;

        let mut folds = Vec::with_capacity(k);
        for fold in k_fold(&examples, k, self.dataset.seed)? {
            info!(
                "Fold {}/{}: {} train, {} test",
                fold.index + 1,
                k,
                fold.train.len(),
                fold.test.len()
            );
            let model = self.trainer.fit(&fold.train, &labels, None)?;
            folds.push(evaluate_model(&model, &fold.test)?);
        }

        let summary = fold_aggregate(&folds)?;
        Ok(CrossValidationReport {
            folds,
            summary,
            skipped,
        })
    }
}

/// Score `examples` in parallel, one engine per chunk, and compute metrics
pub fn evaluate_model<M: TrainedModel>(model: &M, examples: &[TrainingExample]) -> Result<MulticlassMetrics> {
    let scores: Vec<Vec<Vec<f32>>> = examples
        .par_chunks(EVAL_CHUNK)
        .map(|chunk| {
            let mut engine = model.create_engine()?;
            chunk
                .iter()
                .map(|ex| engine.score(&ex.input))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<_>>()?;

    let scores: Vec<Vec<f32>> = scores.into_iter().flatten().collect();
    let truth: Vec<u32> = examples.iter().map(|ex| ex.key).collect();
    evaluate(&scores, &truth, model.schema().num_classes())
}
