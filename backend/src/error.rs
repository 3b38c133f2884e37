//! Error types for model loading, training and prediction.

use std::path::PathBuf;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised by the classifier, the model file and the feature schema.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No model file at the configured path.
    #[error("model not found at {}. Train it first using the train binary", path.display())]
    ModelNotFound { path: PathBuf },

    /// Bad magic bytes or undecodable payload.
    #[error("invalid model format: {reason}")]
    InvalidFormat { reason: String },

    #[error("unsupported model format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// The artifact was trained on a different feature list.
    #[error("feature schema mismatch: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("dimension mismatch: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid training data: {0}")]
    InvalidTrainingData(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl ModelError {
    #[must_use]
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invalid_training_data(reason: impl Into<String>) -> Self {
        Self::InvalidTrainingData(reason.into())
    }
}

impl ResponseError for ModelError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}
