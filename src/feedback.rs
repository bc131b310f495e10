//! Append-only log of client feedback on predictions.
//!
//! Every entry gets a server-side `feedback_id` and RFC 3339 `timestamp`.
//! The CSV layout fixes its header on the first append; later entries are
//! projected onto that header so columns never shift between rows.

use crate::config::{FeedbackConfig, FeedbackFormat};
use crate::error::ChurnError;
use crate::types::record::RawRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const FEEDBACK_ID_FIELD: &str = "feedback_id";
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Result of a successful append
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedbackReceipt {
    pub feedback_id: Uuid,
    /// Payload keys that did not fit the existing CSV header
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_fields: Vec<String>,
}

/// Feedback log writer. Appends are serialized by an internal lock.
pub struct FeedbackLog {
    path: PathBuf,
    format: FeedbackFormat,
    lock: Mutex<()>,
}

impl FeedbackLog {
    pub fn new<P: Into<PathBuf>>(path: P, format: FeedbackFormat) -> Self {
        Self {
            path: path.into(),
            format,
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &FeedbackConfig) -> Self {
        info!(path = %config.path.display(), format = ?config.format, "Feedback log configured");
        Self::new(config.path.clone(), config.format)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FeedbackFormat {
        self.format
    }

    /// Append one entry stamped with the current time
    pub fn append(&self, payload: &RawRecord) -> Result<FeedbackReceipt, ChurnError> {
        self.append_at(payload, Utc::now())
    }

    /// Append one entry with an explicit timestamp
    pub fn append_at(
        &self,
        payload: &RawRecord,
        timestamp: DateTime<Utc>,
    ) -> Result<FeedbackReceipt, ChurnError> {
        let feedback_id = Uuid::new_v4();

        let mut entry = payload.clone();
        entry.insert(
            FEEDBACK_ID_FIELD.to_string(),
            Value::String(feedback_id.to_string()),
        );
        entry.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        let _guard = self
            .lock
            .lock()
            .map_err(|e| ChurnError::Persistence(format!("lock poisoned: {}", e)))?;

        self.ensure_parent_dir()?;
        let ignored_fields = match self.format {
            FeedbackFormat::Csv => self.append_csv(&entry)?,
            FeedbackFormat::Jsonl => {
                self.append_jsonl(&entry)?;
                Vec::new()
            }
        };

        if !ignored_fields.is_empty() {
            warn!(
                feedback_id = %feedback_id,
                ignored = ?ignored_fields,
                "Feedback fields outside the log header were dropped"
            );
        }
        debug!(feedback_id = %feedback_id, path = %self.path.display(), "Feedback appended");

        Ok(FeedbackReceipt {
            feedback_id,
            ignored_fields,
        })
    }

    fn ensure_parent_dir(&self) -> Result<(), ChurnError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                fs::create_dir_all(dir).map_err(|e| self.persistence(e))
            }
            _ => Ok(()),
        }
    }

    fn append_csv(&self, entry: &RawRecord) -> Result<Vec<String>, ChurnError> {
        let (header, fresh) = match self.read_header()? {
            Some(header) => (header, false),
            None => (new_header(entry), true),
        };

        let ignored: Vec<String> = entry
            .keys()
            .filter(|k| !header.contains(*k))
            .cloned()
            .collect();
        let row: Vec<String> = header
            .iter()
            .map(|column| entry.get(column).map(render_cell).unwrap_or_default())
            .collect();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.persistence(e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if fresh {
            writer
                .write_record(&header)
                .map_err(|e| self.persistence(e))?;
        }
        writer.write_record(&row).map_err(|e| self.persistence(e))?;
        writer.flush().map_err(|e| self.persistence(e))?;

        Ok(ignored)
    }

    /// Header of an existing, non-empty CSV log
    fn read_header(&self) -> Result<Option<Vec<String>>, ChurnError> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.persistence(e)),
        }

        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| self.persistence(e))?;
        let header = reader
            .headers()
            .map_err(|e| self.persistence(e))?
            .iter()
            .map(str::to_string)
            .collect();
        Ok(Some(header))
    }

    fn append_jsonl(&self, entry: &RawRecord) -> Result<(), ChurnError> {
        let line = serde_json::to_string(entry).map_err(|e| self.persistence(e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.persistence(e))?;
        writeln!(file, "{}", line).map_err(|e| self.persistence(e))
    }

    fn persistence(&self, err: impl std::fmt::Display) -> ChurnError {
        ChurnError::Persistence(format!("{}: {}", self.path.display(), err))
    }
}

/// Sorted client keys, then the two server columns
fn new_header(entry: &RawRecord) -> Vec<String> {
    let mut header: Vec<String> = entry
        .keys()
        .filter(|k| k.as_str() != FEEDBACK_ID_FIELD && k.as_str() != TIMESTAMP_FIELD)
        .cloned()
        .collect();
    header.sort();
    header.push(FEEDBACK_ID_FIELD.to_string());
    header.push(TIMESTAMP_FIELD.to_string());
    header
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let header = reader.headers().unwrap().iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (header, rows)
    }

    #[test]
    fn test_first_append_creates_file_and_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("feedback.csv");
        let log = FeedbackLog::new(&path, FeedbackFormat::Csv);

        let receipt = log
            .append_at(&record(json!({"CustomerID": "C1", "actual_churn": 1})), ts())
            .unwrap();

        let (header, rows) = read_rows(&path);
        assert_eq!(header, vec!["CustomerID", "actual_churn", "feedback_id", "timestamp"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "C1");
        assert_eq!(rows[0][1], "1");
        assert_eq!(rows[0][2], receipt.feedback_id.to_string());
        assert_eq!(rows[0][3], "2024-03-01T12:00:00.000Z");
        assert!(receipt.ignored_fields.is_empty());
    }

    #[test]
    fn test_later_rows_projected_onto_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.csv");
        let log = FeedbackLog::new(&path, FeedbackFormat::Csv);

        log.append_at(&record(json!({"a": 1, "b": "x"})), ts()).unwrap();
        let receipt = log
            .append_at(&record(json!({"b": "y", "c": true})), ts())
            .unwrap();

        let (header, rows) = read_rows(&path);
        assert_eq!(header, vec!["a", "b", "feedback_id", "timestamp"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "");
        assert_eq!(rows[1][1], "y");
        assert_eq!(receipt.ignored_fields, vec!["c".to_string()]);
    }

    #[test]
    fn test_client_timestamp_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.csv");
        let log = FeedbackLog::new(&path, FeedbackFormat::Csv);

        log.append_at(
            &record(json!({"note": "a, \"quoted\" note", "timestamp": "yesterday"})),
            ts(),
        )
        .unwrap();

        let (header, rows) = read_rows(&path);
        assert_eq!(header, vec!["note", "feedback_id", "timestamp"]);
        assert_eq!(rows[0][0], "a, \"quoted\" note");
        assert_eq!(rows[0][2], "2024-03-01T12:00:00.000Z");
    }

    #[test]
    fn test_jsonl_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let log = FeedbackLog::new(&path, FeedbackFormat::Jsonl);

        log.append_at(&record(json!({"a": 1})), ts()).unwrap();
        log.append_at(&record(json!({"b": [1, 2]})), ts()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["a"], json!(1));
        assert_eq!(lines[1]["b"], json!([1, 2]));
        assert!(lines[1]["feedback_id"].is_string());
    }

    #[test]
    fn test_unwritable_path_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened for appending.
        let log = FeedbackLog::new(dir.path(), FeedbackFormat::Jsonl);

        let err = log.append(&record(json!({"a": 1}))).unwrap_err();
        assert!(matches!(err, ChurnError::Persistence(_)));
    }

    #[test]
    fn test_render_cell() {
        assert_eq!(render_cell(&Value::Null), "");
        assert_eq!(render_cell(&json!(0.5)), "0.5");
        assert_eq!(render_cell(&json!({"k": 1})), "{\"k\":1}");
    }
}
