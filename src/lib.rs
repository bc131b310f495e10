//! Churn Risk Service Library
//!
//! Scores customer records with a pre-trained churn classifier: the
//! training-time feature pipeline is replayed, columns are aligned to the
//! model, and the result is returned with a risk tier and the model's most
//! influential features.

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod feedback;
pub mod metrics;
pub mod models;
pub mod types;

pub use api::{build_router, AppState};
pub use config::AppConfig;
pub use error::ChurnError;
pub use features::FeatureExtractor;
pub use feedback::FeedbackLog;
pub use models::inference::InferenceEngine;
pub use types::{PredictionResult, RawRecord, RiskTier};
