//! Request-path error taxonomy

use crate::features::schema::SchemaVersion;
use thiserror::Error;

/// Errors surfaced to API clients.
///
/// Startup and loading code uses `anyhow`; everything reachable from a
/// request handler returns one of these so the HTTP layer can map it to a
/// status code without string matching.
#[derive(Debug, Error)]
pub enum ChurnError {
    /// `x-api-key` header absent or wrong
    #[error("Unauthorized. Invalid API key.")]
    Unauthorized,

    /// Body could not be read as a tabular record
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Record carries fields the active schema does not declare
    #[error("schema mismatch: fields {unknown:?} are not part of schema {schema}")]
    SchemaMismatch {
        schema: SchemaVersion,
        unknown: Vec<String>,
    },

    /// Feature pipeline or scoring failure
    #[error("{0}")]
    Processing(String),

    /// Feedback log could not be written
    #[error("failed to persist feedback: {0}")]
    Persistence(String),
}

impl ChurnError {
    /// Short machine-readable category, echoed in error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ChurnError::Unauthorized => "authentication",
            ChurnError::InvalidInput(_) => "invalid_input",
            ChurnError::SchemaMismatch { .. } => "schema_mismatch",
            ChurnError::Processing(_) => "processing",
            ChurnError::Persistence(_) => "persistence",
        }
    }
}

impl From<anyhow::Error> for ChurnError {
    fn from(err: anyhow::Error) -> Self {
        ChurnError::Processing(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ChurnError::Unauthorized.kind(), "authentication");
        assert_eq!(ChurnError::Persistence("disk full".into()).kind(), "persistence");
        assert_eq!(ChurnError::Processing("boom".into()).kind(), "processing");
    }

    #[test]
    fn test_schema_mismatch_message() {
        let err = ChurnError::SchemaMismatch {
            schema: SchemaVersion::SubscriptionV1,
            unknown: vec!["premium_amount".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("premium_amount"));
        assert!(msg.contains("subscription-v1"));
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err: ChurnError = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(err.to_string(), "outer: inner");
    }
}
