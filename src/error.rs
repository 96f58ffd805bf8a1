//! Error types for crashcast

use thiserror::Error;

/// Result type alias for crashcast operations
pub type Result<T> = std::result::Result<T, CrashcastError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum CrashcastError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CrashcastError {
    /// Wrap any failure other than `NotFound` as a prediction failure.
    pub fn into_prediction(self) -> Self {
        match self {
            err @ CrashcastError::NotFound(_) => err,
            err @ CrashcastError::Prediction(_) => err,
            other => CrashcastError::Prediction(other.to_string()),
        }
    }
}

impl From<polars::error::PolarsError> for CrashcastError {
    fn from(err: polars::error::PolarsError) -> Self {
        CrashcastError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for CrashcastError {
    fn from(err: serde_json::Error) -> Self {
        CrashcastError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for CrashcastError {
    fn from(err: ndarray::ShapeError) -> Self {
        CrashcastError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CrashcastError::Data("bad column".to_string());
        assert_eq!(err.to_string(), "Data error: bad column");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CrashcastError = io_err.into();
        assert!(matches!(err, CrashcastError::Io(_)));
    }

    #[test]
    fn test_into_prediction_keeps_not_found() {
        let err = CrashcastError::NotFound("model x".to_string()).into_prediction();
        assert!(matches!(err, CrashcastError::NotFound(_)));

        let err = CrashcastError::Shape {
            expected: "3 features".to_string(),
            actual: "2".to_string(),
        }
        .into_prediction();
        match err {
            CrashcastError::Prediction(msg) => assert!(msg.contains("3 features")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
