//! Prediction result data structures

use serde::{Deserialize, Serialize};

/// Risk tier classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Probability at or above which a customer is High risk
    pub const HIGH_THRESHOLD: f64 = 0.70;
    /// Probability at or above which a customer is Medium risk
    pub const MEDIUM_THRESHOLD: f64 = 0.40;

    /// Bucket a churn probability. Both thresholds are inclusive.
    pub fn from_probability(probability: f64) -> Self {
        if probability >= Self::HIGH_THRESHOLD {
            RiskTier::High
        } else if probability >= Self::MEDIUM_THRESHOLD {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scored customer, returned synchronously from `/predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Class-1 probability from the classifier (0.0 - 1.0)
    pub churn_probability: f64,

    /// Tier derived from the probability
    pub risk_tier: RiskTier,

    /// Highest-importance features as `[name, importance]` pairs
    pub top_features: Vec<(String, f64)>,
}

impl PredictionResult {
    pub fn new(churn_probability: f64, top_features: Vec<(String, f64)>) -> Self {
        Self {
            churn_probability,
            risk_tier: RiskTier::from_probability(churn_probability),
            top_features,
        }
    }
}
