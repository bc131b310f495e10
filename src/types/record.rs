//! Raw customer records and the column-oriented frame the feature
//! pipeline operates on.

use crate::error::ChurnError;
use chrono::NaiveDate;
use serde_json::Value;

/// A single customer as supplied by the client: field name to raw value.
pub type RawRecord = serde_json::Map<String, Value>;

/// Typed storage for one column.
///
/// Missing numeric values are `NaN`; missing text and dates are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Text(Vec<Option<String>>),
    Date(Vec<Option<NaiveDate>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }

    pub fn date(name: impl Into<String>, values: Vec<Option<NaiveDate>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Date(values),
        }
    }
}

/// Batch of records stored column by column, in first-seen column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
    rows: usize,
}

impl Frame {
    /// Empty frame with a fixed row count
    pub fn with_rows(rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows,
        }
    }

    /// Build a frame from raw JSON records.
    ///
    /// Column types are inferred from the values present: a column whose
    /// non-null values are all numbers or booleans is numeric, anything else
    /// is text. Nested arrays or objects cannot be placed in a table and are
    /// rejected.
    pub fn from_records(records: &[RawRecord]) -> Result<Self, ChurnError> {
        if records.is_empty() {
            return Err(ChurnError::InvalidInput("no records supplied".to_string()));
        }

        let mut names: Vec<&str> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !names.contains(&key.as_str()) {
                    names.push(key);
                }
            }
        }

        let mut frame = Frame::with_rows(records.len());
        for name in names {
            let cells: Vec<&Value> = records
                .iter()
                .map(|r| r.get(name).unwrap_or(&Value::Null))
                .collect();

            if let Some(bad) = cells.iter().find(|v| v.is_array() || v.is_object()) {
                return Err(ChurnError::InvalidInput(format!(
                    "field `{}` must be a scalar, got {}",
                    name, bad
                )));
            }

            let all_numeric = cells
                .iter()
                .all(|v| v.is_null() || v.is_number() || v.is_boolean());

            let column = if all_numeric {
                Column::numeric(name, cells.iter().map(|v| value_as_f64(v)).collect())
            } else {
                Column::text(name, cells.iter().map(|v| value_as_text(v)).collect())
            };
            frame.columns.push(column);
        }

        Ok(frame)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Values of a numeric column, `None` if absent or not numeric
    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Numeric(values)) => Some(values),
            _ => None,
        }
    }

    /// Values of a date column, `None` if absent or not a date column
    pub fn dates(&self, name: &str) -> Option<&[Option<NaiveDate>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Date(values)) => Some(values),
            _ => None,
        }
    }

    /// Insert a column, replacing any existing column of the same name in place.
    ///
    /// Panics if the column length differs from the frame's row count.
    pub fn set(&mut self, column: Column) {
        assert_eq!(
            column.data.len(),
            self.rows,
            "column `{}` has wrong length",
            column.name
        );
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    /// Remove a column by name
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Consume the frame, yielding its columns
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

fn value_as_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        _ => f64::NAN,
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
