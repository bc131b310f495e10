//! Feature pipeline for churn model inference.
//!
//! Reproduces the transformation applied at training time:
//! clean → engineer → one-hot → align to the model's column order.

pub mod align;
pub mod clean;
pub mod engineer;
pub mod schema;

use crate::error::ChurnError;
use crate::models::manifest::ModelManifest;
use crate::types::record::{Frame, RawRecord};
use align::{AlignmentReport, Scaler};
use chrono::NaiveDate;
use clean::Imputation;
use schema::SchemaVersion;
use std::collections::BTreeMap;
use tracing::debug;

pub use align::{align, one_hot, EncodedFrame};
pub use clean::clean;
pub use engineer::engineer;

/// Transforms raw customer records into model input rows.
///
/// Carries everything the artifact recorded about its training data, so
/// the output columns match `feature_names` exactly in count and order.
pub struct FeatureExtractor {
    schema: SchemaVersion,
    feature_names: Vec<String>,
    imputation: Imputation,
    categories: BTreeMap<String, Vec<String>>,
    scaler: Option<Scaler>,
    reject_unknown_fields: bool,
}

impl FeatureExtractor {
    /// Create a feature extractor for a schema and trained column layout.
    pub fn new(schema: SchemaVersion, feature_names: Vec<String>) -> Self {
        Self {
            schema,
            feature_names,
            imputation: Imputation::default(),
            categories: BTreeMap::new(),
            scaler: None,
            reject_unknown_fields: true,
        }
    }

    /// Create a feature extractor from a model manifest.
    pub fn from_manifest(manifest: &ModelManifest) -> Self {
        Self {
            schema: manifest.schema,
            feature_names: manifest.feature_names.clone(),
            imputation: manifest.imputation.clone(),
            categories: manifest.categories.clone(),
            scaler: manifest.scaler.clone(),
            reject_unknown_fields: true,
        }
    }

    pub fn with_categories(mut self, categories: BTreeMap<String, Vec<String>>) -> Self {
        self.categories = categories;
        self
    }

    /// Whether fields outside the schema fail the request
    pub fn reject_unknown_fields(mut self, reject: bool) -> Self {
        self.reject_unknown_fields = reject;
        self
    }

    /// Extract model input rows from a batch of records.
    ///
    /// Returns one row per record, each `feature_count()` wide.
    pub fn extract(
        &self,
        records: &[RawRecord],
        today: NaiveDate,
    ) -> Result<Vec<Vec<f64>>, ChurnError> {
        if self.reject_unknown_fields {
            self.check_fields(records)?;
        }

        let mut frame = Frame::from_records(records)?;
        clean(&mut frame, self.schema, &self.imputation);
        engineer(&mut frame, self.schema, today);

        for excluded in self.schema.excluded_columns() {
            frame.drop_column(excluded);
        }

        let encoded = one_hot(frame, &self.categories);
        let (rows, report) = align(&encoded, &self.feature_names, self.scaler.as_ref());
        self.log_report(&report);

        Ok(rows)
    }

    fn check_fields(&self, records: &[RawRecord]) -> Result<(), ChurnError> {
        let unknown = self
            .schema
            .unknown_fields(records.iter().flat_map(|r| r.keys().map(String::as_str)));
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ChurnError::SchemaMismatch {
                schema: self.schema,
                unknown,
            })
        }
    }

    fn log_report(&self, report: &AlignmentReport) {
        if !report.missing.is_empty() || !report.dropped.is_empty() {
            debug!(
                schema = %self.schema,
                missing = ?report.missing,
                dropped = ?report.dropped,
                "Aligned features to model schema"
            );
        }
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    /// Get feature names (model input order).
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn schema(&self) -> SchemaVersion {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature_names() -> Vec<String> {
        [
            "Age",
            "Tenure",
            "Usage_Frequency",
            "Support_Calls",
            "Payment_Delay",
            "Contract_Length",
            "Total_Spend",
            "usage_per_tenure",
            "spend_per_month",
            "days_since_last_interaction",
            "Gender_Male",
            "Subscription_Type_Premium",
            "Subscription_Type_Standard",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn extractor() -> FeatureExtractor {
        let mut categories = BTreeMap::new();
        categories.insert(
            "Gender".to_string(),
            vec!["Female".to_string(), "Male".to_string()],
        );
        categories.insert(
            "Subscription_Type".to_string(),
            vec![
                "Basic".to_string(),
                "Premium".to_string(),
                "Standard".to_string(),
            ],
        );
        FeatureExtractor::new(SchemaVersion::SubscriptionV1, feature_names())
            .with_categories(categories)
    }

    fn record(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }

    #[test]
    fn test_feature_extraction() {
        let rows = extractor()
            .extract(
                &[record(json!({
                    "CustomerID": "C-1",
                    "Age": 30,
                    "Tenure": 12,
                    "Usage_Frequency": 5,
                    "Support_Calls": 0,
                    "Payment_Delay": 0,
                    "Contract_Length": 12,
                    "Total_Spend": 1000.0,
                    "Gender": "Male",
                    "Subscription_Type": "Premium",
                    "Last_Interaction": "2024-01-01"
                }))],
                today(),
            )
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), 13);
        assert_eq!(row[0], 30.0); // Age
        assert_eq!(row[1], 12.0); // Tenure
        assert!((row[7] - 5.0 / 13.0).abs() < 1e-12);
        assert!((row[8] - 1000.0 / 13.0).abs() < 1e-12);
        assert_eq!(row[9], 30.0);
        assert_eq!(&row[10..], &[1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_missing_fields_zero_filled() {
        let rows = extractor()
            .extract(&[record(json!({"Age": 45}))], today())
            .unwrap();

        assert_eq!(rows[0].len(), 13);
        assert_eq!(rows[0][0], 45.0);
        assert!(rows[0][1..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_empty_record_still_scores() {
        let rows = extractor().extract(&[RawRecord::new()], today()).unwrap();
        assert_eq!(rows, vec![vec![0.0; 13]]);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = extractor()
            .extract(
                &[record(json!({"Age": 45, "premium_amount": 900.0}))],
                today(),
            )
            .unwrap_err();

        match err {
            ChurnError::SchemaMismatch { schema, unknown } => {
                assert_eq!(schema, SchemaVersion::SubscriptionV1);
                assert_eq!(unknown, vec!["premium_amount".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unknown_fields_dropped_when_permissive() {
        let rows = extractor()
            .reject_unknown_fields(false)
            .extract(
                &[record(json!({"Age": 45, "premium_amount": 900.0}))],
                today(),
            )
            .unwrap();
        assert_eq!(rows[0].len(), 13);
        assert_eq!(rows[0][0], 45.0);
    }

    #[test]
    fn test_feature_count() {
        let extractor = extractor();
        assert_eq!(extractor.feature_count(), 13);
        assert_eq!(extractor.feature_names().len(), 13);
    }
}
