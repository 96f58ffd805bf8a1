//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::CrashcastError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CrashcastError> for ServerError {
    fn from(err: CrashcastError) -> Self {
        match err {
            CrashcastError::NotFound(msg) => ServerError::NotFound(msg),
            CrashcastError::Prediction(msg) => ServerError::Prediction(msg),
            CrashcastError::Training(msg) => ServerError::Training(msg),
            CrashcastError::Io(e) => ServerError::Io(e),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::Prediction(msg) => {
                tracing::warn!(detail = %msg, "Prediction failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Prediction error: {}", msg))
            }
            ServerError::Training(msg) => {
                tracing::error!(detail = %msg, "Training failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Training failed: {}", msg))
            }
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string())
            }
            ServerError::Io(e) => {
                tracing::error!(detail = %e, "IO error");
                (StatusCode::INTERNAL_SERVER_ERROR, "A file system error occurred".to_string())
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
