//! Inference engine module
//!
//! Provides image classification inference with:
//! - Image decoding and preprocessing
//! - Pluggable trained models and trainers
//! - A bounded pool of reusable scoring engines

pub mod centroid;
pub mod model;
#[cfg(feature = "openvino")]
pub mod openvino;
pub mod pool;
pub mod preprocess;

pub use centroid::{CentroidEngine, CentroidModel, CentroidTrainer};
pub use model::{ModelSchema, ModelTrainer, ScoringEngine, TrainedModel, TrainingExample};
#[cfg(feature = "openvino")]
pub use self::openvino::{OpenVinoEngine, OpenVinoModel};
pub use pool::{EnginePool, PoolConfig, PoolStats, PooledEngine, PredictionResult};
pub use preprocess::{PixelBuffer, Preprocessor};
