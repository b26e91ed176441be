//! Error types for chainperf

use thiserror::Error;

/// Result type alias for chainperf operations
pub type Result<T> = std::result::Result<T, ChainPerfError>;

/// Main error type. Every variant is fatal to a cross-validation run.
#[derive(Error, Debug)]
pub enum ChainPerfError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Numerical error during {stage} at epoch {epoch}: {detail}")]
    NumericalError {
        stage: String,
        epoch: usize,
        detail: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },
}

impl From<polars::error::PolarsError> for ChainPerfError {
    fn from(err: polars::error::PolarsError) -> Self {
        ChainPerfError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainPerfError {
    fn from(err: serde_json::Error) -> Self {
        ChainPerfError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for ChainPerfError {
    fn from(err: bincode::Error) -> Self {
        ChainPerfError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ChainPerfError {
    fn from(err: ndarray::ShapeError) -> Self {
        ChainPerfError::ShapeError {
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
        let err = ChainPerfError::ConfigError("unknown dataset".to_string());
        assert_eq!(err.to_string(), "Configuration error: unknown dataset");

        let err = ChainPerfError::NumericalError {
            stage: "train".to_string(),
            epoch: 3,
            detail: "loss is NaN".to_string(),
        };
        assert_eq!(err.to_string(), "Numerical error during train at epoch 3: loss is NaN");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ChainPerfError = io_err.into();
        assert!(matches!(err, ChainPerfError::IoError(_)));
    }
}
