//! Cleaning: schema-driven type coercion and missing value imputation.

use crate::features::schema::{FieldKind, SchemaVersion};
use crate::types::record::{Column, ColumnData, Frame};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Imputation statistics captured at training time.
///
/// Per-request statistics are meaningless for a single row, so these are
/// shipped with the model artifact. Batch statistics are only a fallback
/// for columns the artifact has no entry for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Imputation {
    /// Median per numeric column
    #[serde(default)]
    pub medians: BTreeMap<String, f64>,
    /// Most frequent value per categorical column
    #[serde(default)]
    pub modes: BTreeMap<String, String>,
}

/// Coerce declared field types, then fill missing numeric and text values.
pub fn clean(frame: &mut Frame, schema: SchemaVersion, imputation: &Imputation) {
    coerce_types(frame, schema);

    let names: Vec<String> = frame.column_names().map(str::to_string).collect();
    for name in names {
        let Some(column) = frame.column_mut(&name) else {
            continue;
        };
        match &mut column.data {
            ColumnData::Numeric(values) => {
                if !values.iter().any(|v| v.is_nan()) {
                    continue;
                }
                let fill = imputation
                    .medians
                    .get(&name)
                    .copied()
                    .or_else(|| median(values));
                if let Some(fill) = fill {
                    debug!(column = %name, fill, "Imputing numeric column");
                    for v in values.iter_mut().filter(|v| v.is_nan()) {
                        *v = fill;
                    }
                }
            }
            ColumnData::Text(values) => {
                if values.iter().all(Option::is_some) {
                    continue;
                }
                let fill = imputation
                    .modes
                    .get(&name)
                    .cloned()
                    .or_else(|| mode(values));
                if let Some(fill) = fill {
                    debug!(column = %name, fill = %fill, "Imputing text column");
                    for v in values.iter_mut().filter(|v| v.is_none()) {
                        *v = Some(fill.clone());
                    }
                }
            }
            ColumnData::Date(_) => {}
        }
    }
}

/// Cast columns to the kind the schema declares for them.
fn coerce_types(frame: &mut Frame, schema: SchemaVersion) {
    let names: Vec<String> = frame.column_names().map(str::to_string).collect();
    for name in names {
        let Some(spec) = schema.field(&name) else {
            continue;
        };
        let Some(column) = frame.column(&name) else {
            continue;
        };

        let coerced = match (spec.kind, &column.data) {
            (FieldKind::Numeric, ColumnData::Text(values)) => {
                let parsed: Vec<f64> = values
                    .iter()
                    .map(|v| {
                        v.as_deref()
                            .and_then(|s| s.trim().parse::<f64>().ok())
                            .unwrap_or(f64::NAN)
                    })
                    .collect();
                let rejected = values
                    .iter()
                    .zip(&parsed)
                    .filter(|(raw, p)| raw.is_some() && p.is_nan())
                    .count();
                if rejected > 0 {
                    warn!(column = %name, rejected, "Non-numeric values treated as missing");
                }
                Some(Column::numeric(&name, parsed))
            }
            (FieldKind::Categorical, ColumnData::Numeric(values)) => Some(Column::text(
                &name,
                values
                    .iter()
                    .map(|v| if v.is_nan() { None } else { Some(v.to_string()) })
                    .collect(),
            )),
            (FieldKind::Date, ColumnData::Text(values)) => {
                let parsed: Vec<Option<NaiveDate>> = values
                    .iter()
                    .map(|v| v.as_deref().and_then(parse_date))
                    .collect();
                let rejected = values
                    .iter()
                    .zip(&parsed)
                    .filter(|(raw, p)| raw.is_some() && p.is_none())
                    .count();
                if rejected > 0 {
                    warn!(column = %name, rejected, "Unparsable dates treated as missing");
                }
                Some(Column::date(&name, parsed))
            }
            (FieldKind::Date, ColumnData::Numeric(values)) => {
                Some(Column::date(&name, vec![None; values.len()]))
            }
            _ => None,
        };

        if let Some(column) = coerced {
            frame.set(column);
        }
    }
}

/// Parse the date representations clients are known to send.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok()
}

/// Median of the non-NaN values
pub fn median(values: &[f64]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

/// Most frequent present value; ties go to the lexically smallest
pub fn mode(values: &[Option<String>]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values.iter().flatten() {
        *counts.entry(v.as_str()).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}
