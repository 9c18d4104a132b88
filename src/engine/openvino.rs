//! OpenVINO-backed models
//!
//! Loads an IR model (`.xml` + `.bin`) plus a JSON sidecar holding the
//! [`ModelSchema`]. The sidecar sits next to the model as `<model>.schema.json`.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use openvino::{CompiledModel, Core, ElementType, InferRequest, Shape, Tensor};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::info;

use super::model::{ModelSchema, ScoringEngine, TrainedModel};
use super::preprocess::PixelBuffer;
use crate::error::{ClassifyError, Result};
use crate::utils::math::softmax;

fn ov_err(e: impl std::fmt::Display) -> ClassifyError {
    ClassifyError::model(format!("openvino: {}", e))
}

/// Wrapper for OpenVINO CompiledModel that implements Send + Sync
struct SafeCompiledModel(Mutex<CompiledModel>);
unsafe impl Send for SafeCompiledModel {}
unsafe impl Sync for SafeCompiledModel {}

impl Deref for SafeCompiledModel {
    type Target = Mutex<CompiledModel>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Infer requests are used by one thread at a time through the pool
struct SafeInferRequest(InferRequest);
unsafe impl Send for SafeInferRequest {}

#[derive(Debug, Deserialize)]
struct Sidecar {
    schema: ModelSchema,
    /// Set when the network emits raw logits rather than probabilities
    #[serde(default)]
    logits: bool,
}

/// Compiled OpenVINO network with its label schema
pub struct OpenVinoModel {
    compiled: Arc<SafeCompiledModel>,
    schema: ModelSchema,
    logits: bool,
}

impl OpenVinoModel {
    /// Sidecar location for a model file
    pub fn schema_path(model_path: &Path) -> PathBuf {
        model_path.with_extension("schema.json")
    }

    pub fn load(path: impl AsRef<Path>, device: &str) -> Result<Self> {
        let path = path.as_ref();
        let sidecar: Sidecar = serde_json::from_reader(std::io::BufReader::new(
            std::fs::File::open(Self::schema_path(path))?,
        ))?;

        info!("Loading OpenVINO model from {:?} on {}", path, device);
        let start = Instant::now();

        let path_str = path
            .to_str()
            .ok_or_else(|| ClassifyError::InvalidInput(format!("non-UTF-8 path {:?}", path)))?;
        let mut core = Core::new().map_err(ov_err)?;
        let model = core.read_model_from_file(path_str, "").map_err(ov_err)?;
        let compiled = core
            .compile_model(&model, device.into())
            .map_err(ov_err)?;

        info!("Model compiled in {:?}", start.elapsed());

        Ok(Self {
            compiled: Arc::new(SafeCompiledModel(Mutex::new(compiled))),
            schema: sidecar.schema,
            logits: sidecar.logits,
        })
    }
}

impl TrainedModel for OpenVinoModel {
    type Engine = OpenVinoEngine;

    fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    fn create_engine(&self) -> Result<OpenVinoEngine> {
        let request = self.compiled.lock().create_infer_request().map_err(ov_err)?;
        Ok(OpenVinoEngine {
            request: SafeInferRequest(request),
            schema: self.schema.clone(),
            logits: self.logits,
        })
    }
}

/// One infer request; not shared between threads
pub struct OpenVinoEngine {
    request: SafeInferRequest,
    schema: ModelSchema,
    logits: bool,
}

impl ScoringEngine for OpenVinoEngine {
    fn score(&mut self, input: &PixelBuffer) -> Result<Vec<f32>> {
        self.schema.check_input(input)?;

        let tensor = input.to_nchw();
        let dims: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let shape = Shape::new(&dims).map_err(ov_err)?;
        let mut ov_input = Tensor::new(ElementType::F32, &shape).map_err(ov_err)?;

        let data: Vec<f32> = tensor.iter().copied().collect();
        unsafe {
            let dst = ov_input.get_raw_data_mut().map_err(ov_err)?.as_mut_ptr() as *mut f32;
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        let request = &mut self.request.0;
        request.set_input_tensor(&ov_input).map_err(ov_err)?;
        request.infer().map_err(ov_err)?;

        let output = request.get_output_tensor().map_err(ov_err)?;
        let output_len = output
            .get_shape()
            .map_err(ov_err)?
            .get_dimensions()
            .iter()
            .product::<i64>() as usize;

        let expected = self.schema.num_classes();
        if output_len != expected {
            return Err(ClassifyError::DimensionMismatch {
                expected: format!("{} scores", expected),
                actual: format!("{} scores", output_len),
            });
        }

        let scores: Vec<f32> = unsafe {
            let ptr = output.get_raw_data().map_err(ov_err)?.as_ptr() as *const f32;
            std::slice::from_raw_parts(ptr, output_len).to_vec()
        };

        Ok(if self.logits { softmax(&scores) } else { scores })
    }
}
