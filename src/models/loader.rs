//! Model artifact loader

use crate::features::schema::SchemaVersion;
use crate::models::classifier::{
    Classifier, ConstantClassifier, DecisionTree, GradientBoosting, LogisticRegression,
    RandomForest,
};
use crate::models::manifest::{ModelManifest, ModelSpec};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Loaded model: manifest metadata plus a ready classifier.
///
/// Immutable after load and shared read-only by every request.
pub struct ModelArtifact {
    manifest: ModelManifest,
    classifier: Box<dyn Classifier>,
}

impl ModelArtifact {
    /// Pair a manifest with an already-built classifier
    pub fn new(manifest: ModelManifest, classifier: Box<dyn Classifier>) -> Result<Self> {
        manifest.validate()?;
        Ok(Self {
            manifest,
            classifier,
        })
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn schema(&self) -> SchemaVersion {
        self.manifest.schema
    }

    pub fn model_type(&self) -> &'static str {
        self.classifier.model_type()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.manifest.feature_names
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    /// Class probabilities for one aligned row
    pub fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        self.classifier.predict_proba(features)
    }

    /// Per-feature importance, aligned with `feature_names`.
    ///
    /// Importances recorded in the manifest win; otherwise a linear model's
    /// coefficient magnitudes are used.
    pub fn importances(&self) -> Option<Vec<f64>> {
        if let Some(importances) = &self.manifest.importances {
            return Some(importances.magnitudes());
        }
        self.classifier
            .coefficients()
            .map(|coef| coef.iter().map(|c| c.abs()).collect())
    }
}

/// Loader for model artifact bundles
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of ONNX threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load a bundle from its manifest path
    pub fn load<P: AsRef<Path>>(&self, manifest_path: P) -> Result<ModelArtifact> {
        let manifest_path = manifest_path.as_ref();
        info!(path = %manifest_path.display(), "Loading model manifest");

        let manifest = ModelManifest::from_path(manifest_path)?;
        let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let classifier = self
            .build_classifier(&manifest, base_dir)
            .with_context(|| format!("Failed to build classifier for `{}`", manifest.name))?;

        info!(
            model = %manifest.name,
            schema = %manifest.schema,
            model_type = classifier.model_type(),
            features = manifest.feature_names.len(),
            "Model loaded successfully"
        );

        ModelArtifact::new(manifest, classifier)
    }

    fn build_classifier(
        &self,
        manifest: &ModelManifest,
        base_dir: &Path,
    ) -> Result<Box<dyn Classifier>> {
        let n_features = manifest.feature_names.len();
        let classifier: Box<dyn Classifier> = match &manifest.model {
            ModelSpec::LogisticRegression {
                coefficients,
                intercept,
            } => Box::new(LogisticRegression::new(coefficients.clone(), *intercept)),
            ModelSpec::GradientBoosting {
                init_score,
                learning_rate,
                trees,
            } => Box::new(GradientBoosting::new(
                *init_score,
                *learning_rate,
                trees.iter().map(DecisionTree::from).collect(),
                n_features,
            )),
            ModelSpec::RandomForest { trees } => Box::new(RandomForest::new(
                trees.iter().map(DecisionTree::from).collect(),
                n_features,
            )),
            ModelSpec::Constant { probability } => Box::new(ConstantClassifier::new(*probability)),
            ModelSpec::Onnx { path } => {
                let path = base_dir.join(path);
                self.load_onnx(&path, n_features)?
            }
        };
        Ok(classifier)
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(&self, path: &Path, n_features: usize) -> Result<Box<dyn Classifier>> {
        let classifier =
            crate::models::onnx::OnnxClassifier::load(path, n_features, self.onnx_threads)?;
        Ok(Box::new(classifier))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(&self, path: &Path, _n_features: usize) -> Result<Box<dyn Classifier>> {
        anyhow::bail!(
            "model {} is an ONNX graph but this build lacks the `onnx` feature (threads configured: {})",
            path.display(),
            self.onnx_threads
        )
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_manifest(dir: &TempDir, value: serde_json::Value) -> std::path::PathBuf {
        let path = dir.path().join("manifest.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", value).unwrap();
        path
    }

    #[test]
    fn test_load_logistic_bundle() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            json!({
                "name": "lr",
                "schema": "subscription-v1",
                "feature_names": ["Age", "Support_Calls"],
                "model": {"type": "logistic_regression", "coefficients": [0.01, -0.8], "intercept": 0.0}
            }),
        );

        let artifact = ModelLoader::new().load(&path).unwrap();

        assert_eq!(artifact.name(), "lr");
        assert_eq!(artifact.model_type(), "logistic_regression");
        assert_eq!(artifact.importances(), Some(vec![0.01, 0.8]));
    }

    #[test]
    fn test_manifest_importances_override_coefficients() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            json!({
                "name": "lr",
                "schema": "subscription-v1",
                "feature_names": ["Age", "Support_Calls"],
                "importances": {"kind": "feature_importances", "values": [0.3, 0.7]},
                "model": {"type": "logistic_regression", "coefficients": [0.01, -0.8], "intercept": 0.0}
            }),
        );

        let artifact = ModelLoader::new().load(&path).unwrap();
        assert_eq!(artifact.importances(), Some(vec![0.3, 0.7]));
    }

    #[test]
    fn test_no_importances_for_constant_model() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            json!({
                "name": "stub",
                "schema": "policy-renewal-v1",
                "feature_names": ["premium_amount"],
                "model": {"type": "constant", "probability": 0.1}
            }),
        );

        let artifact = ModelLoader::new().load(&path).unwrap();
        assert_eq!(artifact.schema(), SchemaVersion::PolicyRenewalV1);
        assert!(artifact.importances().is_none());
    }

    #[test]
    fn test_missing_manifest_fails() {
        let dir = TempDir::new().unwrap();
        let err = ModelLoader::new()
            .load(dir.path().join("absent.json"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("Failed to read model manifest"));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_requires_feature() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            json!({
                "name": "graph",
                "schema": "subscription-v1",
                "feature_names": ["Age"],
                "model": {"type": "onnx", "path": "model.onnx"}
            }),
        );

        assert!(ModelLoader::new().load(&path).is_err());
    }
}
