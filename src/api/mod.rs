//! HTTP surface of the churn risk service

pub mod auth;
pub mod error;
pub mod handlers;

use crate::config::AuthConfig;
use crate::feedback::FeedbackLog;
use crate::metrics::ServiceMetrics;
use crate::models::inference::InferenceEngine;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared, read-mostly state handed to every handler
pub struct AppState {
    pub engine: Arc<InferenceEngine>,
    pub feedback: Arc<FeedbackLog>,
    pub metrics: Arc<ServiceMetrics>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(
        engine: Arc<InferenceEngine>,
        feedback: Arc<FeedbackLog>,
        metrics: Arc<ServiceMetrics>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            engine,
            feedback,
            metrics,
            auth,
        }
    }
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::liveness))
        .route("/predict", post(handlers::predict))
        .route("/predict/batch", post(handlers::predict_batch))
        .route("/feedback", post(handlers::feedback))
        .route("/model", get(handlers::model_info))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}
