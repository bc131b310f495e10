//! ONNX Runtime backed classifier.
//!
//! Used when a model is exported with skl2onnx/onnxmltools instead of in
//! the manifest's native formats.

use crate::models::classifier::Classifier;
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Loaded ONNX session with resolved input/output names
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    n_features: usize,
}

impl OnnxClassifier {
    /// Load an ONNX graph from file
    pub fn load<P: AsRef<Path>>(path: P, n_features: usize, threads: usize) -> Result<Self> {
        let path = path.as_ref();

        ort::init().commit()?;
        info!(path = %path.display(), threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "probabilities".to_string())
            });

        info!(input = %input_name, output = %output_name, "ONNX model loaded");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            n_features,
        })
    }

    /// Class-1 probability from whichever output layout the exporter chose
    fn extract_probability(&self, outputs: &SessionOutputs) -> Result<f64> {
        if let Some(output) = outputs.get(self.output_name.as_str()) {
            if let Some(p) = probability_from_value(&output) {
                return Ok(p);
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(p) = probability_from_value(&output) {
                debug!(output = %name, prob = p, "Extracted probability from fallback output");
                return Ok(p);
            }
        }

        anyhow::bail!("no probability output found in ONNX model")
    }
}

fn probability_from_value(output: &DynValue) -> Option<f64> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        let classes = dims.last().copied().unwrap_or(0);
        return match classes {
            c if c >= 2 => data.get(1).map(|&p| p as f64),
            1 => data.first().map(|&p| p as f64),
            _ => None,
        };
    }

    // seq(map(int64, float)) as produced by zipmap-enabled exports
    if DynSequenceValueType::can_downcast(&output.dtype()) {
        let allocator = Allocator::default();
        let sequence = output.downcast_ref::<DynSequenceValueType>().ok()?;
        let maps = sequence
            .try_extract_sequence::<DynMapValueType>(&allocator)
            .ok()?;
        let pairs = maps.first()?.try_extract_key_values::<i64, f32>().ok()?;
        if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 1) {
            return Some(*p as f64);
        }
        if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 0) {
            return Some(1.0 - *p as f64);
        }
    }

    warn!("ONNX output in unsupported layout");
    None
}

impl Classifier for OnnxClassifier {
    fn model_type(&self) -> &'static str {
        "onnx"
    }

    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        anyhow::ensure!(
            features.len() == self.n_features,
            "feature vector has {} values, model expects {}",
            features.len(),
            self.n_features
        );

        let input: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let shape = vec![1_i64, input.len() as i64];
        let tensor = Tensor::from_array((shape, input)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;

        let p1 = self.extract_probability(&outputs)?;
        Ok([1.0 - p1, p1])
    }
}
