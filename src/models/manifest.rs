//! Model artifact bundle format.
//!
//! The manifest is the single file the service loads at startup. Besides
//! the classifier itself it records everything the feature pipeline needs
//! to reproduce training-time preprocessing: schema version, column
//! order, imputation statistics, categorical levels and scaler.

use crate::features::align::Scaler;
use crate::features::clean::Imputation;
use crate::features::schema::SchemaVersion;
use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Per-feature influence recorded with the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum Importances {
    /// Tree-ensemble or permutation importances, reported by magnitude
    FeatureImportances(Vec<f64>),
    /// Linear model coefficients, reported by magnitude
    Coefficients(Vec<f64>),
}

impl Importances {
    pub fn len(&self) -> usize {
        match self {
            Importances::FeatureImportances(v) | Importances::Coefficients(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as reported to clients
    pub fn magnitudes(&self) -> Vec<f64> {
        match self {
            Importances::FeatureImportances(v) | Importances::Coefficients(v) => {
                v.iter().map(|c| c.abs()).collect()
            }
        }
    }
}

/// Decision tree in flattened array form.
///
/// Node `i` is a leaf when `children_left[i] == -1`; otherwise a row goes
/// left when `x[feature[i]] <= threshold[i]`. `value[i]` is the leaf output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSpec {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<f64>,
}

impl TreeSpec {
    fn validate(&self, n_features: usize) -> Result<()> {
        let n = self.children_left.len();
        ensure!(n > 0, "tree has no nodes");
        ensure!(
            self.children_right.len() == n
                && self.feature.len() == n
                && self.threshold.len() == n
                && self.value.len() == n,
            "tree arrays have inconsistent lengths"
        );

        for i in 0..n {
            let (left, right) = (self.children_left[i], self.children_right[i]);
            if left == -1 {
                ensure!(right == -1, "node {} has only one child", i);
                ensure!(self.value[i].is_finite(), "leaf {} has non-finite value", i);
                continue;
            }
            // Children always come after their parent, which also rules out cycles.
            for child in [left, right] {
                ensure!(
                    child > i as i64 && (child as usize) < n,
                    "node {} points to invalid child {}",
                    i,
                    child
                );
            }
            let feature = self.feature[i];
            ensure!(
                feature >= 0 && (feature as usize) < n_features,
                "node {} splits on unknown feature {}",
                i,
                feature
            );
            ensure!(!self.threshold[i].is_nan(), "node {} has NaN threshold", i);
        }
        Ok(())
    }
}

/// The classifier stored in the bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    GradientBoosting {
        /// Raw log-odds before any tree is added
        init_score: f64,
        learning_rate: f64,
        trees: Vec<TreeSpec>,
    },
    RandomForest {
        /// Leaf values are class-1 probabilities
        trees: Vec<TreeSpec>,
    },
    Constant {
        probability: f64,
    },
    Onnx {
        /// Relative paths resolve against the manifest's directory
        path: PathBuf,
    },
}

impl ModelSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            ModelSpec::LogisticRegression { .. } => "logistic_regression",
            ModelSpec::GradientBoosting { .. } => "gradient_boosting",
            ModelSpec::RandomForest { .. } => "random_forest",
            ModelSpec::Constant { .. } => "constant",
            ModelSpec::Onnx { .. } => "onnx",
        }
    }
}

/// Manifest describing a trained churn model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Human-readable model name
    pub name: String,
    /// Feature-engineering contract the model was trained on
    pub schema: SchemaVersion,
    /// Model input columns, in order
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub imputation: Imputation,
    /// Training-time levels per categorical column
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub scaler: Option<Scaler>,
    #[serde(default)]
    pub importances: Option<Importances>,
    pub model: ModelSpec,
}

impl ModelManifest {
    /// Read and validate a manifest file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model manifest {}", path.display()))?;
        let manifest: ModelManifest = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse model manifest {}", path.display()))?;
        manifest
            .validate()
            .with_context(|| format!("Invalid model manifest {}", path.display()))?;
        Ok(manifest)
    }

    /// Check internal consistency: every per-feature vector matches the
    /// column count and the classifier parameters are well formed.
    pub fn validate(&self) -> Result<()> {
        let n = self.feature_names.len();
        ensure!(n > 0, "feature_names is empty");

        let mut seen = HashSet::new();
        for name in &self.feature_names {
            ensure!(seen.insert(name.as_str()), "duplicate feature `{}`", name);
        }

        if let Some(scaler) = &self.scaler {
            ensure!(
                scaler.mean.len() == n && scaler.scale.len() == n,
                "scaler has {} means and {} scales for {} features",
                scaler.mean.len(),
                scaler.scale.len(),
                n
            );
            ensure!(
                scaler.mean.iter().all(|m| m.is_finite()),
                "scaler means must be finite"
            );
            ensure!(
                scaler.scale.iter().all(|s| s.is_finite() && *s >= 0.0),
                "scaler scales must be finite and non-negative"
            );
        }

        if let Some(importances) = &self.importances {
            ensure!(
                importances.len() == n,
                "{} importances for {} features",
                importances.len(),
                n
            );
        }

        match &self.model {
            ModelSpec::LogisticRegression {
                coefficients,
                intercept,
            } => {
                ensure!(
                    coefficients.len() == n,
                    "{} coefficients for {} features",
                    coefficients.len(),
                    n
                );
                ensure!(
                    intercept.is_finite() && coefficients.iter().all(|c| c.is_finite()),
                    "logistic regression parameters must be finite"
                );
            }
            ModelSpec::GradientBoosting {
                init_score,
                learning_rate,
                trees,
            } => {
                ensure!(
                    init_score.is_finite() && learning_rate.is_finite(),
                    "gradient boosting init_score and learning_rate must be finite"
                );
                ensure!(!trees.is_empty(), "gradient boosting has no trees");
                for (i, tree) in trees.iter().enumerate() {
                    tree.validate(n).with_context(|| format!("tree {}", i))?;
                }
            }
            ModelSpec::RandomForest { trees } => {
                ensure!(!trees.is_empty(), "random forest has no trees");
                for (i, tree) in trees.iter().enumerate() {
                    tree.validate(n).with_context(|| format!("tree {}", i))?;
                    ensure!(
                        tree.value.iter().all(|v| (0.0..=1.0).contains(v)),
                        "tree {} has leaf probabilities outside [0, 1]",
                        i
                    );
                }
            }
            ModelSpec::Constant { probability } => {
                if !(0.0..=1.0).contains(probability) {
                    bail!("constant probability {} outside [0, 1]", probability);
                }
            }
            ModelSpec::Onnx { path } => {
                ensure!(!path.as_os_str().is_empty(), "onnx model path is empty");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(model: serde_json::Value) -> serde_json::Value {
        json!({
            "name": "test",
            "schema": "subscription-v1",
            "feature_names": ["Age", "Tenure"],
            "model": model
        })
    }

    fn parse(value: serde_json::Value) -> Result<ModelManifest> {
        let manifest: ModelManifest = serde_json::from_value(value)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn stump() -> serde_json::Value {
        json!({
            "children_left": [1, -1, -1],
            "children_right": [2, -1, -1],
            "feature": [0, -2, -2],
            "threshold": [40.0, -2.0, -2.0],
            "value": [0.0, -0.5, 0.5]
        })
    }

    #[test]
    fn test_minimal_manifest_defaults() {
        let m = parse(manifest(json!({"type": "constant", "probability": 0.3}))).unwrap();
        assert_eq!(m.schema, SchemaVersion::SubscriptionV1);
        assert!(m.imputation.medians.is_empty());
        assert!(m.scaler.is_none());
        assert_eq!(m.model.type_name(), "constant");
    }

    #[test]
    fn test_coefficient_count_must_match() {
        let err = parse(manifest(json!({
            "type": "logistic_regression",
            "coefficients": [0.1],
            "intercept": 0.0
        })))
        .unwrap_err();
        assert!(err.to_string().contains("coefficients"));
    }

    #[test]
    fn test_importances_parse_and_magnitudes() {
        let mut value = manifest(json!({"type": "constant", "probability": 0.5}));
        value["importances"] = json!({"kind": "coefficients", "values": [-0.7, 0.2]});
        let m = parse(value).unwrap();
        assert_eq!(m.importances.unwrap().magnitudes(), vec![0.7, 0.2]);
    }

    #[test]
    fn test_negative_feature_importances_use_magnitude() {
        let mut value = manifest(json!({"type": "constant", "probability": 0.5}));
        value["importances"] = json!({"kind": "feature_importances", "values": [0.1, -0.9]});
        let m = parse(value).unwrap();
        assert_eq!(m.importances.unwrap().magnitudes(), vec![0.1, 0.9]);
    }

    #[test]
    fn test_scaler_parameters_validated() {
        let mut value = manifest(json!({"type": "constant", "probability": 0.5}));
        value["scaler"] = json!({"mean": [40.0, 12.0], "scale": [10.0, 0.0]});
        let m = parse(value).unwrap();

        let mut negative = m.clone();
        negative.scaler.as_mut().unwrap().scale[1] = -1.0;
        let err = negative.validate().unwrap_err();
        assert!(err.to_string().contains("non-negative"));

        let mut infinite = m.clone();
        infinite.scaler.as_mut().unwrap().scale[0] = f64::INFINITY;
        assert!(infinite.validate().is_err());

        let mut nan_mean = m;
        nan_mean.scaler.as_mut().unwrap().mean[0] = f64::NAN;
        let err = nan_mean.validate().unwrap_err();
        assert!(err.to_string().contains("means must be finite"));
    }

    #[test]
    fn test_gradient_boosting_tree_validation() {
        let ok = manifest(json!({
            "type": "gradient_boosting",
            "init_score": 0.0,
            "learning_rate": 0.1,
            "trees": [stump()]
        }));
        assert!(parse(ok).is_ok());

        let mut bad_tree = stump();
        bad_tree["feature"] = json!([5, -2, -2]);
        let bad = manifest(json!({
            "type": "gradient_boosting",
            "init_score": 0.0,
            "learning_rate": 0.1,
            "trees": [bad_tree]
        }));
        let err = parse(bad).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown feature"));
    }

    #[test]
    fn test_cyclic_tree_rejected() {
        let mut tree = stump();
        tree["children_left"] = json!([0, -1, -1]);
        let value = manifest(json!({"type": "random_forest", "trees": [tree]}));
        assert!(parse(value).is_err());
    }

    #[test]
    fn test_constant_probability_range() {
        assert!(parse(manifest(json!({"type": "constant", "probability": 1.2}))).is_err());
    }

    #[test]
    fn test_duplicate_feature_names_rejected() {
        let mut value = manifest(json!({"type": "constant", "probability": 0.5}));
        value["feature_names"] = json!(["Age", "Age"]);
        assert!(parse(value).is_err());
    }

    #[test]
    fn test_unknown_schema_rejected() {
        let mut value = manifest(json!({"type": "constant", "probability": 0.5}));
        value["schema"] = json!("subscription-v2");
        assert!(parse(value).is_err());
    }
}
