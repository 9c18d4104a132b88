//! Prediction Service - Core business logic
//!
//! Validates raw image bytes, preprocesses them to the model's input shape
//! and scores them through the engine pool.

use std::time::Instant;

use tracing::debug;

use crate::dataset::{classify, ImageFormat, ImageSource};
use crate::engine::{EnginePool, Preprocessor, TrainedModel};
use crate::error::{ClassifyError, Result};

use super::types::{LabelScore, PredictionSummary};

/// Classifies images against one trained model
pub struct PredictionService<M: TrainedModel> {
    pool: EnginePool<M>,
    preprocessor: Preprocessor,
}

impl<M: TrainedModel> Clone for PredictionService<M> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            preprocessor: self.preprocessor,
        }
    }
}

impl<M: TrainedModel> PredictionService<M> {
    /// Create a service; preprocessing follows the pooled model's schema
    pub fn new(pool: EnginePool<M>) -> Self {
        let preprocessor = pool.model().schema().preprocessor();
        Self { pool, preprocessor }
    }

    pub fn pool(&self) -> &EnginePool<M> {
        &self.pool
    }

    pub fn labels(&self) -> &[String] {
        self.pool.model().schema().labels.labels()
    }

    /// Check that bytes carry an accepted image format, without decoding
    pub fn validate(data: &[u8]) -> Result<ImageFormat> {
        if data.is_empty() {
            return Err(ClassifyError::EmptyPayload);
        }
        match classify(data) {
            format if format.is_accepted() => Ok(format),
            format => Err(ClassifyError::UnsupportedFormat(format)),
        }
    }

    /// Validate, preprocess and score one image
    pub async fn classify(&self, data: Vec<u8>, image_id: impl Into<String>) -> Result<PredictionSummary> {
        let start = Instant::now();
        let image_id = image_id.into();
        let format = Self::validate(&data)?;
        debug!("Classifying {} ({})", image_id, format);

        let preprocessor = self.preprocessor;
        let input = tokio::task::spawn_blocking(move || preprocessor.prepare(&data))
            .await
            .map_err(|e| ClassifyError::model(format!("preprocessing task failed: {}", e)))??;

        let prediction = self.pool.predict(input).await?;

        let labels = &self.pool.model().schema().labels;
        let mut scores = prediction
            .scores
            .iter()
            .enumerate()
            .map(|(key, &score)| {
                Ok(LabelScore {
                    label: labels.to_label(key as u32)?.to_string(),
                    score,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(PredictionSummary {
            image_id,
            predicted_label: prediction.predicted_label,
            probability: prediction.score,
            scores,
            execution_time_ms: start.elapsed().as_millis() as u64,
            inference_time_ms: prediction.latency.as_millis() as u64,
        })
    }

    /// Classify an image held in memory or on disk
    pub async fn classify_source(&self, source: &ImageSource) -> Result<PredictionSummary> {
        match source {
            ImageSource::RawBytes(bytes) => self.classify(bytes.to_vec(), "memory").await,
            ImageSource::FilePath(path) => {
                let data = tokio::fs::read(path).await?;
                let image_id = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.classify(data, image_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{KeyOrdinality, LabelKeyMapper};
    use crate::engine::{CentroidTrainer, ModelTrainer, PixelBuffer, PoolConfig, TrainingExample};
    use crate::utils::image::encode_png;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::Arc;

    fn png(value: u8) -> Vec<u8> {
        encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            8,
            8,
            Rgb([value, value, value]),
        )))
        .unwrap()
    }

    fn service() -> PredictionService<crate::engine::CentroidModel> {
        let labels = LabelKeyMapper::build(["dark", "light"], KeyOrdinality::ByValue);
        let example = |value: u8, key: u32| TrainingExample {
            input: PixelBuffer::new(4, 4, 1, vec![value; 16]).unwrap(),
            key,
        };
        let train = vec![example(20, 0), example(10, 0), example(230, 1), example(250, 1)];
        let model = CentroidTrainer::default().fit(&train, &labels, None).unwrap();
        PredictionService::new(EnginePool::new(Arc::new(model), PoolConfig::default()))
    }

    #[tokio::test]
    async fn test_classify_png() {
        let service = service();
        let summary = service.classify(png(240), "light.png").await.unwrap();
        assert_eq!(summary.image_id, "light.png");
        assert_eq!(summary.predicted_label, "light");
        assert_eq!(summary.scores[0].label, "light");
        assert_eq!(summary.probability, summary.scores[0].score);
        assert_eq!(summary.scores.len(), 2);

        let summary = service.classify(png(5), "dark.png").await.unwrap();
        assert_eq!(summary.predicted_label, "dark");
    }

    #[tokio::test]
    async fn test_rejects_empty_and_unsupported() {
        let service = service();
        assert!(matches!(
            service.classify(Vec::new(), "empty").await,
            Err(ClassifyError::EmptyPayload)
        ));
        assert!(matches!(
            service.classify(b"GIF89a....".to_vec(), "anim.gif").await,
            Err(ClassifyError::UnsupportedFormat(ImageFormat::Gif))
        ));
        assert!(matches!(
            service.classify(b"BM".to_vec(), "tiny.bmp").await,
            Err(ClassifyError::UnsupportedFormat(ImageFormat::Bmp))
        ));
    }

    #[tokio::test]
    async fn test_engine_available_after_rejected_payload() {
        let labels = LabelKeyMapper::build(["a"], KeyOrdinality::ByValue);
        let train = vec![TrainingExample {
            input: PixelBuffer::new(4, 4, 1, vec![0; 16]).unwrap(),
            key: 0,
        }];
        let model = CentroidTrainer::default().fit(&train, &labels, None).unwrap();
        let service = PredictionService::new(EnginePool::new(
            Arc::new(model),
            PoolConfig {
                max_engines: 1,
                acquire_timeout: Some(std::time::Duration::from_millis(200)),
            },
        ));

        // Passes the sniffer, fails to decode
        let truncated = vec![137, 80, 78, 71, 13, 10, 26, 10, 0, 0];
        assert!(service.classify(truncated, "broken.png").await.is_err());
        assert!(service.classify(b"BM".to_vec(), "x.bmp").await.is_err());

        let summary = service.classify(png(0), "ok.png").await.unwrap();
        assert_eq!(summary.predicted_label, "a");
        assert_eq!(service.pool().stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_classify_source_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        std::fs::write(&path, png(250)).unwrap();

        let service = service();
        let summary = service.classify_source(&ImageSource::FilePath(path)).await.unwrap();
        assert_eq!(summary.image_id, "sample.png");
        assert_eq!(summary.predicted_label, "light");
    }
}
