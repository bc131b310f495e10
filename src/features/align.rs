//! Schema alignment: categorical encoding and reindexing onto the column
//! layout the model was trained with.

use crate::types::record::{ColumnData, Frame};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Standard scaler parameters, one entry per model feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    fn apply(&self, row: &mut [f64]) {
        for ((x, mean), scale) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
            let scale = if *scale == 0.0 { 1.0 } else { *scale };
            *x = (*x - mean) / scale;
        }
    }
}

/// Purely numeric columns after encoding, before reindexing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedFrame {
    pub columns: Vec<(String, Vec<f64>)>,
    pub rows: usize,
}

impl EncodedFrame {
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }
}

/// What reindexing had to paper over
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentReport {
    /// Model features the input did not produce (zero-filled)
    pub missing: Vec<String>,
    /// Input columns the model does not know (dropped)
    pub dropped: Vec<String>,
}

/// One-hot encode text columns, dropping the first level of each.
///
/// Levels come from `categories` (training-time levels) when available,
/// otherwise from the distinct values in the batch. Either way they are
/// sorted lexically and the smallest is the dropped reference level.
/// Date columns are removed; numeric columns pass through.
pub fn one_hot(frame: Frame, categories: &BTreeMap<String, Vec<String>>) -> EncodedFrame {
    let rows = frame.len();
    let mut numeric = Vec::new();
    let mut dummies = Vec::new();

    for column in frame.into_columns() {
        match column.data {
            ColumnData::Numeric(values) => numeric.push((column.name, values)),
            ColumnData::Date(_) => debug!(column = %column.name, "Dropping date column"),
            ColumnData::Text(values) => {
                let levels: Vec<String> = match categories.get(&column.name) {
                    Some(trained) => {
                        let set: BTreeSet<&String> = trained.iter().collect();
                        set.into_iter().cloned().collect()
                    }
                    None => {
                        let set: BTreeSet<&String> = values.iter().flatten().collect();
                        set.into_iter().cloned().collect()
                    }
                };

                let unseen: BTreeSet<&str> = values
                    .iter()
                    .flatten()
                    .filter(|v| !levels.contains(*v))
                    .map(String::as_str)
                    .collect();
                if !unseen.is_empty() {
                    warn!(column = %column.name, levels = ?unseen, "Unseen categorical levels encoded as reference");
                }

                for level in levels.iter().skip(1) {
                    let indicator: Vec<f64> = values
                        .iter()
                        .map(|v| if v.as_ref() == Some(level) { 1.0 } else { 0.0 })
                        .collect();
                    dummies.push((format!("{}_{}", column.name, level), indicator));
                }
            }
        }
    }

    numeric.extend(dummies);
    EncodedFrame {
        columns: numeric,
        rows,
    }
}

/// Reindex onto `feature_names` and produce row-major model input.
///
/// Absent features are zero-filled, unknown columns dropped, non-finite
/// values replaced by zero, then the scaler (if any) is applied.
pub fn align(
    encoded: &EncodedFrame,
    feature_names: &[String],
    scaler: Option<&Scaler>,
) -> (Vec<Vec<f64>>, AlignmentReport) {
    let mut report = AlignmentReport::default();
    let mut rows = vec![Vec::with_capacity(feature_names.len()); encoded.rows];

    for name in feature_names {
        match encoded.get(name) {
            Some(values) => {
                for (row, v) in rows.iter_mut().zip(values) {
                    row.push(if v.is_finite() { *v } else { 0.0 });
                }
            }
            None => {
                report.missing.push(name.clone());
                for row in rows.iter_mut() {
                    row.push(0.0);
                }
            }
        }
    }

    report.dropped = encoded
        .names()
        .filter(|n| !feature_names.iter().any(|f| f == n))
        .map(str::to_string)
        .collect();

    if let Some(scaler) = scaler {
        for row in rows.iter_mut() {
            scaler.apply(row);
        }
    }

    (rows, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::Column;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn text_frame(name: &str, values: &[Option<&str>]) -> Frame {
        let mut frame = Frame::with_rows(values.len());
        frame.set(Column::text(
            name,
            values.iter().map(|v| v.map(str::to_string)).collect(),
        ));
        frame
    }

    #[test]
    fn test_drop_first_with_trained_levels() {
        let frame = text_frame("Subscription_Type", &[Some("Standard"), Some("Basic")]);
        let mut categories = BTreeMap::new();
        // Deliberately unsorted: encoding must sort before dropping the first level.
        categories.insert(
            "Subscription_Type".to_string(),
            names(&["Standard", "Premium", "Basic"]),
        );

        let encoded = one_hot(frame, &categories);

        let cols: Vec<&str> = encoded.names().collect();
        assert_eq!(
            cols,
            vec!["Subscription_Type_Premium", "Subscription_Type_Standard"]
        );
        assert_eq!(encoded.get("Subscription_Type_Standard"), Some(&[1.0, 0.0][..]));
        assert_eq!(encoded.get("Subscription_Type_Premium"), Some(&[0.0, 0.0][..]));
    }

    #[test]
    fn test_single_row_batch_levels_drop_everything() {
        let frame = text_frame("Gender", &[Some("Male")]);
        let encoded = one_hot(frame, &BTreeMap::new());
        assert!(encoded.columns.is_empty());
    }

    #[test]
    fn test_unseen_and_missing_levels_encode_as_zero() {
        let frame = text_frame("Gender", &[Some("Other"), None]);
        let mut categories = BTreeMap::new();
        categories.insert("Gender".to_string(), names(&["Female", "Male"]));

        let encoded = one_hot(frame, &categories);

        assert_eq!(encoded.get("Gender_Male"), Some(&[0.0, 0.0][..]));
    }

    #[test]
    fn test_dates_dropped_numeric_kept() {
        let mut frame = Frame::with_rows(1);
        frame.set(Column::numeric("Age", vec![30.0]));
        frame.set(Column::date("renewal_date", vec![None]));

        let encoded = one_hot(frame, &BTreeMap::new());

        let cols: Vec<&str> = encoded.names().collect();
        assert_eq!(cols, vec!["Age"]);
    }

    #[test]
    fn test_align_zero_fills_and_orders() {
        let encoded = EncodedFrame {
            columns: vec![
                ("Tenure".to_string(), vec![12.0]),
                ("Extra".to_string(), vec![7.0]),
                ("Age".to_string(), vec![30.0]),
            ],
            rows: 1,
        };

        let (rows, report) = align(&encoded, &names(&["Age", "Gender_Male", "Tenure"]), None);

        assert_eq!(rows, vec![vec![30.0, 0.0, 12.0]]);
        assert_eq!(report.missing, names(&["Gender_Male"]));
        assert_eq!(report.dropped, names(&["Extra"]));
    }

    #[test]
    fn test_align_replaces_non_finite() {
        let encoded = EncodedFrame {
            columns: vec![
                ("a".to_string(), vec![f64::NAN]),
                ("b".to_string(), vec![f64::INFINITY]),
            ],
            rows: 1,
        };

        let (rows, _) = align(&encoded, &names(&["a", "b"]), None);

        assert_eq!(rows, vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn test_scaler_applied_after_alignment() {
        let encoded = EncodedFrame {
            columns: vec![("a".to_string(), vec![12.0])],
            rows: 1,
        };
        let scaler = Scaler {
            mean: vec![10.0, 5.0],
            scale: vec![2.0, 0.0],
        };

        let (rows, _) = align(&encoded, &names(&["a", "b"]), Some(&scaler));

        assert_eq!(rows, vec![vec![1.0, -5.0]]);
    }
}
