//! Native classifier implementations for the model families the training
//! pipeline exports.

use crate::models::manifest::TreeSpec;
use anyhow::{ensure, Result};

/// A trained binary classifier.
///
/// Implementations are immutable after construction and shared across
/// request handlers.
pub trait Classifier: Send + Sync {
    /// Model family, e.g. `logistic_regression`
    fn model_type(&self) -> &'static str;

    /// Class probabilities `[p0, p1]` for one aligned feature row
    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]>;

    /// Linear coefficients, for models that have them
    fn coefficients(&self) -> Option<&[f64]> {
        None
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn proba(p1: f64) -> [f64; 2] {
    [1.0 - p1, p1]
}

fn check_width(features: &[f64], expected: usize) -> Result<()> {
    ensure!(
        features.len() == expected,
        "feature vector has {} values, model expects {}",
        features.len(),
        expected
    );
    Ok(())
}

/// `p = σ(intercept + w·x)`
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticRegression {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }
}

impl Classifier for LogisticRegression {
    fn model_type(&self) -> &'static str {
        "logistic_regression"
    }

    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        check_width(features, self.coefficients.len())?;
        let z = self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        Ok(proba(sigmoid(z)))
    }

    fn coefficients(&self) -> Option<&[f64]> {
        Some(&self.coefficients)
    }
}

/// Flattened decision tree, validated at manifest load
#[derive(Debug, Clone)]
pub struct DecisionTree {
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    value: Vec<f64>,
}

impl DecisionTree {
    /// Leaf output for one row
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut node = 0usize;
        while self.children_left[node] != -1 {
            let x = features[self.feature[node] as usize];
            node = if x <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        self.value[node]
    }
}

impl From<&TreeSpec> for DecisionTree {
    fn from(spec: &TreeSpec) -> Self {
        Self {
            children_left: spec.children_left.clone(),
            children_right: spec.children_right.clone(),
            feature: spec.feature.clone(),
            threshold: spec.threshold.clone(),
            value: spec.value.clone(),
        }
    }
}

/// Binary gradient boosting: `p = σ(init + lr · Σ tree(x))`
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    init_score: f64,
    learning_rate: f64,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl GradientBoosting {
    pub fn new(
        init_score: f64,
        learning_rate: f64,
        trees: Vec<DecisionTree>,
        n_features: usize,
    ) -> Self {
        Self {
            init_score,
            learning_rate,
            trees,
            n_features,
        }
    }
}

impl Classifier for GradientBoosting {
    fn model_type(&self) -> &'static str {
        "gradient_boosting"
    }

    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        check_width(features, self.n_features)?;
        let raw = self.init_score
            + self.learning_rate * self.trees.iter().map(|t| t.evaluate(features)).sum::<f64>();
        Ok(proba(sigmoid(raw)))
    }
}

/// Averaged class-1 probabilities of independent trees
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(trees: Vec<DecisionTree>, n_features: usize) -> Self {
        Self { trees, n_features }
    }
}

impl Classifier for RandomForest {
    fn model_type(&self) -> &'static str {
        "random_forest"
    }

    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        check_width(features, self.n_features)?;
        let total: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
        Ok(proba(total / self.trees.len() as f64))
    }
}

/// Returns the same probability for every input
#[derive(Debug, Clone)]
pub struct ConstantClassifier {
    probability: f64,
}

impl ConstantClassifier {
    pub fn new(probability: f64) -> Self {
        Self { probability }
    }
}

impl Classifier for ConstantClassifier {
    fn model_type(&self) -> &'static str {
        "constant"
    }

    fn predict_proba(&self, _features: &[f64]) -> Result<[f64; 2]> {
        Ok(proba(self.probability))
    }
}
