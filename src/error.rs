//! Error types for dataset ingestion, training and inference

use thiserror::Error;

use crate::dataset::ImageFormat;

/// Result alias used by the core modules
pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Errors raised by the classification core
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// Image bytes are not JPEG or PNG
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(ImageFormat),

    /// Request carried no image bytes
    #[error("empty image payload")]
    EmptyPayload,

    /// Label was not observed when the key mapping was built
    #[error("unknown label: {0}")]
    UnknownLabel(String),

    /// Key is outside the range of the key mapping
    #[error("unknown label key: {0}")]
    UnknownKey(u32),

    /// Test fraction outside the open interval (0, 1)
    #[error("test fraction must lie strictly between 0 and 1, got {0}")]
    InvalidFraction(f64),

    /// Cross-fold statistics need at least two folds
    #[error("at least 2 folds are required, got {0}")]
    InsufficientFolds(usize),

    /// Declared image dimensions do not match the pixel count
    #[error("invalid image: {width}x{height}x{channels} does not match {actual} bytes")]
    InvalidImage {
        width: u32,
        height: u32,
        channels: u8,
        actual: usize,
    },

    /// Input does not have the shape the model expects
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// Nothing to train or evaluate on
    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    /// Malformed argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No engine became available within the caller's deadline
    #[error("timed out after {0:?} waiting for an inference engine")]
    PoolTimeout(std::time::Duration),

    /// Pool has been shut down
    #[error("inference engine pool is closed")]
    PoolClosed,

    /// Model construction or scoring failure
    #[error("model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClassifyError {
    /// Whether the error is caused by the caller's input rather than by the service.
    ///
    /// Client errors are rejected per request and never affect shared state.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ClassifyError::UnsupportedFormat(_)
                | ClassifyError::EmptyPayload
                | ClassifyError::UnknownLabel(_)
                | ClassifyError::UnknownKey(_)
                | ClassifyError::InvalidImage { .. }
                | ClassifyError::DimensionMismatch { .. }
                | ClassifyError::InvalidInput(_)
                | ClassifyError::Image(_)
        )
    }

    /// Whether the error is a failed key/label lookup
    pub fn is_unknown_label(&self) -> bool {
        matches!(self, ClassifyError::UnknownLabel(_) | ClassifyError::UnknownKey(_))
    }

    pub(crate) fn model(msg: impl Into<String>) -> Self {
        ClassifyError::Model(msg.into())
    }
}
