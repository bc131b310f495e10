//! Route handlers.
//!
//! Every handler takes the raw body so the API key can be checked before
//! anything in the request is parsed.

use crate::api::auth::{authorize, masked_key};
use crate::api::AppState;
use crate::error::ChurnError;
use crate::features::schema::SchemaVersion;
use crate::feedback::FeedbackReceipt;
use crate::metrics::MetricsSnapshot;
use crate::types::prediction::PredictionResult;
use crate::types::record::RawRecord;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const LIVENESS_MESSAGE: &str = "Churn Prediction API is running.";

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub predictions: Vec<PredictionResult>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub status: &'static str,
    pub message: &'static str,
    #[serde(flatten)]
    pub receipt: FeedbackReceipt,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub schema: SchemaVersion,
    pub model_type: &'static str,
    pub feature_names: Vec<String>,
    pub top_features: Vec<(String, f64)>,
}

/// `GET /`
pub async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

/// `POST /predict`
pub async fn predict(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PredictionResult>, ChurnError> {
    let started = Instant::now();
    state.check_key(&headers, "/predict")?;

    let record = parse_object(&body).map_err(|e| state.reject(e, None))?;
    let result = state
        .engine
        .predict(&record)
        .map_err(|e| state.reject(e, Some(&record)))?;

    state
        .metrics
        .record_prediction(result.churn_probability, result.risk_tier);
    state.metrics.record_latency(started.elapsed());
    info!(
        churn_probability = result.churn_probability,
        risk_tier = ?result.risk_tier,
        latency_us = started.elapsed().as_micros() as u64,
        "Prediction served"
    );

    Ok(Json(result))
}

/// `POST /predict/batch`
pub async fn predict_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BatchResponse>, ChurnError> {
    let started = Instant::now();
    state.check_key(&headers, "/predict/batch")?;

    let records = parse_array(&body).map_err(|e| state.reject(e, None))?;
    let predictions = state
        .engine
        .predict_batch(&records)
        .map_err(|e| state.reject_batch(e, &records))?;

    for p in &predictions {
        state.metrics.record_prediction(p.churn_probability, p.risk_tier);
    }
    state.metrics.record_latency(started.elapsed());
    info!(
        records = predictions.len(),
        latency_us = started.elapsed().as_micros() as u64,
        "Batch prediction served"
    );

    Ok(Json(BatchResponse { predictions }))
}

/// `POST /feedback`
pub async fn feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<FeedbackResponse>, ChurnError> {
    if state.auth.require_key_for_feedback {
        state.check_key(&headers, "/feedback")?;
    }

    let record = parse_object(&body).map_err(|e| state.reject(e, None))?;

    let log = state.feedback.clone();
    let outcome = tokio::task::spawn_blocking(move || log.append(&record))
        .await
        .map_err(|e| ChurnError::Persistence(format!("feedback task failed: {}", e)))
        .and_then(|r| r);

    match outcome {
        Ok(receipt) => {
            state.metrics.record_feedback(true);
            info!(feedback_id = %receipt.feedback_id, "Feedback recorded");
            Ok(Json(FeedbackResponse {
                status: "success",
                message: "Feedback recorded.",
                receipt,
            }))
        }
        Err(e) => {
            state.metrics.record_feedback(false);
            error!(error = %e, path = %state.feedback.path().display(), "Failed to persist feedback");
            Err(e)
        }
    }
}

/// `GET /model`
pub async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    let engine = &state.engine;
    Json(ModelInfo {
        name: engine.model_name().to_string(),
        schema: engine.schema(),
        model_type: engine.model_type(),
        feature_names: engine.feature_names().to_vec(),
        top_features: engine.top_features().to_vec(),
    })
}

/// `GET /metrics`
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

impl AppState {
    fn check_key(&self, headers: &HeaderMap, route: &'static str) -> Result<(), ChurnError> {
        authorize(headers, &self.auth.api_key).map_err(|e| {
            self.metrics.record_auth_failure();
            warn!(route, key = %masked_key(headers), "Rejected request with invalid API key");
            e
        })
    }

    /// Count and log a failed request, returning the error for the response
    fn reject(&self, err: ChurnError, payload: Option<&RawRecord>) -> ChurnError {
        match &err {
            ChurnError::InvalidInput(_) | ChurnError::SchemaMismatch { .. } => {
                self.metrics.record_invalid_request();
                warn!(error = %err, "Rejected request");
            }
            ChurnError::Processing(_) => {
                self.metrics.record_processing_failure();
                let payload = payload
                    .map(|p| Value::Object(p.clone()).to_string())
                    .unwrap_or_default();
                error!(error = %err, payload = %payload, "Prediction failed");
            }
            _ => debug!(error = %err, "Request failed"),
        }
        err
    }

    fn reject_batch(&self, err: ChurnError, records: &[RawRecord]) -> ChurnError {
        if let ChurnError::Processing(_) = &err {
            self.metrics.record_processing_failure();
            let payload = Value::Array(records.iter().cloned().map(Value::Object).collect());
            error!(error = %err, payload = %payload, "Batch prediction failed");
            return err;
        }
        self.reject(err, None)
    }
}

fn parse_json(body: &[u8]) -> Result<Value, ChurnError> {
    serde_json::from_slice(body)
        .map_err(|e| ChurnError::InvalidInput(format!("body is not valid JSON: {}", e)))
}

/// Body as a single flat record
fn parse_object(body: &[u8]) -> Result<RawRecord, ChurnError> {
    match parse_json(body)? {
        Value::Object(map) => Ok(map),
        other => Err(ChurnError::InvalidInput(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

/// Body as an array of records
fn parse_array(body: &[u8]) -> Result<Vec<RawRecord>, ChurnError> {
    let items = match parse_json(body)? {
        Value::Array(items) => items,
        other => {
            return Err(ChurnError::InvalidInput(format!(
                "expected a JSON array of objects, got {}",
                json_type(&other)
            )))
        }
    };
    if items.is_empty() {
        return Err(ChurnError::InvalidInput("batch is empty".to_string()));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(ChurnError::InvalidInput(format!(
                "item {} is {}, expected an object",
                i,
                json_type(&other)
            ))),
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
