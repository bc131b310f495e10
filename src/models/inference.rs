//! Churn inference engine

use crate::config::AppConfig;
use crate::error::ChurnError;
use crate::features::schema::SchemaVersion;
use crate::features::FeatureExtractor;
use crate::models::loader::{ModelArtifact, ModelLoader};
use crate::types::prediction::PredictionResult;
use crate::types::record::RawRecord;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Number of features reported with each prediction
pub const TOP_FEATURE_COUNT: usize = 3;

/// Scores raw customer records against the loaded model.
///
/// Holds no mutable state: identical input and artifact always give
/// identical output.
pub struct InferenceEngine {
    artifact: ModelArtifact,
    extractor: FeatureExtractor,
    top_features: Vec<(String, f64)>,
}

impl InferenceEngine {
    /// Create a new inference engine from configuration
    pub fn new(config: &AppConfig) -> Result<Self> {
        let loader = ModelLoader::with_threads(config.model.onnx_threads);
        let artifact = loader.load(&config.model.manifest_path)?;
        Ok(Self::from_artifact(
            artifact,
            config.model.reject_unknown_fields,
        ))
    }

    /// Create inference engine around an already loaded artifact
    pub fn from_artifact(artifact: ModelArtifact, reject_unknown_fields: bool) -> Self {
        let extractor = FeatureExtractor::from_manifest(artifact.manifest())
            .reject_unknown_fields(reject_unknown_fields);

        let top_features = artifact
            .importances()
            .map(|values| rank_importances(artifact.feature_names(), &values, TOP_FEATURE_COUNT))
            .unwrap_or_default();

        info!(
            model = %artifact.name(),
            schema = %artifact.schema(),
            model_type = artifact.model_type(),
            top_features = ?top_features,
            reject_unknown_fields,
            "Inference engine initialized"
        );

        Self {
            artifact,
            extractor,
            top_features,
        }
    }

    /// Score one record as of today (UTC)
    pub fn predict(&self, record: &RawRecord) -> Result<PredictionResult, ChurnError> {
        self.predict_at(record, Utc::now().date_naive())
    }

    /// Score one record with an explicit reference date
    pub fn predict_at(
        &self,
        record: &RawRecord,
        today: NaiveDate,
    ) -> Result<PredictionResult, ChurnError> {
        let mut results = self.predict_batch_at(std::slice::from_ref(record), today)?;
        results
            .pop()
            .ok_or_else(|| ChurnError::Processing("no prediction produced".to_string()))
    }

    /// Score a batch of records as of today (UTC)
    pub fn predict_batch(
        &self,
        records: &[RawRecord],
    ) -> Result<Vec<PredictionResult>, ChurnError> {
        self.predict_batch_at(records, Utc::now().date_naive())
    }

    /// Score a batch of records with an explicit reference date.
    ///
    /// Batch statistics only matter for columns the artifact carries no
    /// imputation values or categorical levels for.
    pub fn predict_batch_at(
        &self,
        records: &[RawRecord],
        today: NaiveDate,
    ) -> Result<Vec<PredictionResult>, ChurnError> {
        let rows = self.extractor.extract(records, today)?;

        rows.iter()
            .map(|row| {
                let probability = self.score(row)?;
                let result = PredictionResult::new(probability, self.top_features.clone());
                debug!(
                    model = %self.artifact.name(),
                    churn_probability = probability,
                    risk_tier = ?result.risk_tier,
                    "Prediction complete"
                );
                Ok(result)
            })
            .collect()
    }

    /// Class-1 probability for one aligned row
    fn score(&self, row: &[f64]) -> Result<f64, ChurnError> {
        let [_, p1] = self.artifact.predict_proba(row)?;
        if !(0.0..=1.0).contains(&p1) {
            return Err(ChurnError::Processing(format!(
                "model `{}` returned invalid probability {}",
                self.artifact.name(),
                p1
            )));
        }
        Ok(p1)
    }

    /// Highest-importance features, precomputed at load
    pub fn top_features(&self) -> &[(String, f64)] {
        &self.top_features
    }

    pub fn model_name(&self) -> &str {
        self.artifact.name()
    }

    pub fn model_type(&self) -> &'static str {
        self.artifact.model_type()
    }

    pub fn schema(&self) -> SchemaVersion {
        self.artifact.schema()
    }

    pub fn feature_names(&self) -> &[String] {
        self.artifact.feature_names()
    }

    /// Get the number of model input features
    pub fn feature_count(&self) -> usize {
        self.extractor.feature_count()
    }
}

/// Pair names with importance magnitudes and keep the `n` largest.
///
/// Signs are dropped. Ordered by magnitude descending, then by name so
/// ties are stable.
pub fn rank_importances(names: &[String], importances: &[f64], n: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = names
        .iter()
        .cloned()
        .zip(importances.iter().map(|v| v.abs()))
        .filter(|(_, v)| !v.is_nan())
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classifier::{ConstantClassifier, LogisticRegression};
    use crate::models::manifest::{ModelManifest, ModelSpec};
    use crate::types::prediction::RiskTier;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn manifest(model: ModelSpec) -> ModelManifest {
        ModelManifest {
            name: "test".to_string(),
            schema: SchemaVersion::SubscriptionV1,
            feature_names: names(&["Age", "Support_Calls", "Tenure"]),
            imputation: Default::default(),
            categories: Default::default(),
            scaler: None,
            importances: None,
            model,
        }
    }

    fn record(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_rank_importances_ties_broken_by_name() {
        let ranked = rank_importances(
            &names(&["d", "b", "a", "c"]),
            &[0.1, 0.5, 0.5, 0.3],
            3,
        );
        assert_eq!(
            ranked,
            vec![
                ("a".to_string(), 0.5),
                ("b".to_string(), 0.5),
                ("c".to_string(), 0.3)
            ]
        );
    }

    #[test]
    fn test_rank_importances_by_magnitude() {
        let ranked = rank_importances(&names(&["a", "b", "c", "d"]), &[0.1, -0.9, 0.2, 0.3], 3);
        assert_eq!(
            ranked,
            vec![
                ("b".to_string(), 0.9),
                ("d".to_string(), 0.3),
                ("c".to_string(), 0.2)
            ]
        );
    }

    #[test]
    fn test_rank_importances_fewer_than_n() {
        let ranked = rank_importances(&names(&["x"]), &[0.2], 3);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_constant_model_prediction() {
        let m = manifest(ModelSpec::Constant { probability: 0.55 });
        let artifact = ModelArtifact::new(m, Box::new(ConstantClassifier::new(0.55))).unwrap();
        let engine = InferenceEngine::from_artifact(artifact, true);

        let result = engine.predict_at(&record(json!({"Age": 30})), today()).unwrap();

        assert_eq!(result.churn_probability, 0.55);
        assert_eq!(result.risk_tier, RiskTier::Medium);
        assert!(result.top_features.is_empty());
    }

    #[test]
    fn test_linear_model_top_features_from_coefficients() {
        let coefficients = vec![0.02, 0.9, -0.4];
        let m = manifest(ModelSpec::LogisticRegression {
            coefficients: coefficients.clone(),
            intercept: -1.0,
        });
        let artifact =
            ModelArtifact::new(m, Box::new(LogisticRegression::new(coefficients, -1.0))).unwrap();
        let engine = InferenceEngine::from_artifact(artifact, true);

        assert_eq!(
            engine.top_features(),
            &[
                ("Support_Calls".to_string(), 0.9),
                ("Tenure".to_string(), 0.4),
                ("Age".to_string(), 0.02)
            ]
        );

        let result = engine
            .predict_at(&record(json!({"Age": 50, "Support_Calls": 4, "Tenure": 2})), today())
            .unwrap();
        assert!(result.churn_probability > 0.5);
        assert_eq!(result.top_features.len(), 3);
    }

    #[test]
    fn test_batch_prediction() {
        let m = manifest(ModelSpec::Constant { probability: 0.2 });
        let artifact = ModelArtifact::new(m, Box::new(ConstantClassifier::new(0.2))).unwrap();
        let engine = InferenceEngine::from_artifact(artifact, true);

        let results = engine
            .predict_batch_at(
                &[record(json!({"Age": 30})), record(json!({"Tenure": 3}))],
                today(),
            )
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.risk_tier == RiskTier::Low));
    }

    struct BrokenClassifier;

    impl crate::models::classifier::Classifier for BrokenClassifier {
        fn model_type(&self) -> &'static str {
            "broken"
        }

        fn predict_proba(&self, _features: &[f64]) -> anyhow::Result<[f64; 2]> {
            Ok([f64::NAN, f64::NAN])
        }
    }

    #[test]
    fn test_invalid_probability_is_processing_error() {
        let m = manifest(ModelSpec::Constant { probability: 0.2 });
        let artifact = ModelArtifact::new(m, Box::new(BrokenClassifier)).unwrap();
        let engine = InferenceEngine::from_artifact(artifact, true);

        let err = engine.predict_at(&record(json!({})), today()).unwrap_err();
        assert!(matches!(err, ChurnError::Processing(_)));
    }
}
