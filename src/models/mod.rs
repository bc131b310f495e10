//! Churn model artifact loading and inference

pub mod classifier;
pub mod inference;
pub mod loader;
pub mod manifest;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use classifier::Classifier;
pub use inference::InferenceEngine;
pub use loader::{ModelArtifact, ModelLoader};
pub use manifest::ModelManifest;
