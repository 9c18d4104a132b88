//! Image classification service configuration

use serde::Deserialize;
use std::path::PathBuf;

use crate::dataset::KeyOrdinality;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub inference: InferenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub rest_port: u16,
    /// Accepted uploads are copied here when set
    pub upload_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub root: PathBuf,
    pub use_folder_name_as_label: bool,
    pub default_label: String,
    pub test_fraction: f64,
    /// Omit for a non-reproducible shuffle
    pub seed: Option<u64>,
    pub key_ordinality: KeyOrdinality,
    pub grayscale: bool,
    pub cv_folds: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    pub temperature: f32,
    pub predictions_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Upper bound on engines checked out at once
    pub max_engines: usize,
    /// Omit to wait indefinitely for a free engine
    pub acquire_timeout_ms: Option<u64>,
    pub device: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub with_target: bool,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }

    /// Reject settings that would only fail later, after expensive work
    pub fn validate(&self) -> anyhow::Result<()> {
        crate::dataset::split::validate_fraction(self.dataset.test_fraction)?;
        if self.dataset.cv_folds < 2 {
            return Err(crate::error::ClassifyError::InsufficientFolds(self.dataset.cv_folds).into());
        }
        if self.inference.max_engines == 0 {
            anyhow::bail!("inference.max_engines must be at least 1");
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            anyhow::bail!("model input dimensions must be non-zero");
        }
        if !(self.model.temperature > 0.0) {
            anyhow::bail!("model.temperature must be positive");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            dataset: DatasetConfig::default(),
            model: ModelConfig::default(),
            inference: InferenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rest_port: 5000,
            upload_dir: None,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("assets/inputs/img"),
            use_folder_name_as_label: true,
            default_label: "unlabeled".to_string(),
            test_fraction: 0.2,
            seed: None,
            key_ordinality: KeyOrdinality::ByValue,
            grayscale: true,
            cv_folds: 5,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("assets/outputs/imageClassifier.json"),
            input_width: 64,
            input_height: 64,
            temperature: 0.05,
            predictions_dir: PathBuf::from("assets/inputs/predictions"),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_engines: 4,
            acquire_timeout_ms: Some(30_000),
            device: "CPU".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: false,
        }
    }
}
