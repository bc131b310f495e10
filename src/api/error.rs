//! HTTP mapping for [`ChurnError`]

use crate::error::ChurnError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

impl ChurnError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChurnError::Unauthorized => StatusCode::UNAUTHORIZED,
            ChurnError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ChurnError::SchemaMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ChurnError::Processing(_) | ChurnError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ChurnError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
