//! Service layer module

pub mod prediction;
pub mod training;
pub mod types;

pub use prediction::PredictionService;
pub use training::{evaluate_model, TrainingPipeline};
pub use types::*;
