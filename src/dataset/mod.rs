//! Dataset ingestion
//!
//! Provides:
//! - Magic-number format sniffing
//! - Directory scanning with folder-name labels
//! - Label key mapping
//! - Seeded train/test splits and k-fold assignment

pub mod format;
pub mod labels;
pub mod scanner;
pub mod split;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

pub use format::{classify, is_accepted, ImageFormat};
pub use labels::{KeyOrdinality, LabelKeyMapper};
pub use scanner::{DatasetScanner, LabelSource};
pub use split::{k_fold, split, Fold, LabeledSplit};

/// Where an image's bytes come from
#[derive(Debug, Clone)]
pub enum ImageSource {
    RawBytes(Arc<[u8]>),
    FilePath(PathBuf),
}

impl ImageSource {
    /// Load the bytes, reading from disk for path sources
    pub fn resolve(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            ImageSource::RawBytes(bytes) => Ok(Cow::Borrowed(&bytes[..])),
            ImageSource::FilePath(path) => Ok(Cow::Owned(std::fs::read(path)?)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ImageSource::FilePath(path) => Some(path),
            ImageSource::RawBytes(_) => None,
        }
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::RawBytes(bytes.into())
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::FilePath(path)
    }
}

/// A labeled image
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub source: ImageSource,
    pub label: String,
}

impl ImageRecord {
    pub fn new(source: impl Into<ImageSource>, label: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            label: label.into(),
        }
    }

    /// File name for path-backed records
    pub fn file_name(&self) -> Option<String> {
        self.source
            .path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }
}
