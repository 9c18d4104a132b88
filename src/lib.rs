//! Image Classification Service Library

pub mod api;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod service;
pub mod utils;

pub use config::Config;
pub use error::{ClassifyError, Result};
