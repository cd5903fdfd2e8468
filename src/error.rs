//! Error types for the phenoqc engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for phenoqc operations
pub type Result<T> = std::result::Result<T, PhenoQcError>;

/// Main error type for the phenoqc engine
#[derive(Error, Debug)]
pub enum PhenoQcError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Tuning error: {0}")]
    TuningError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Load error: {0}")]
    LoadError(String),
}

impl PhenoQcError {
    /// Stable label recorded in error markers
    pub fn kind(&self) -> &'static str {
        match self {
            PhenoQcError::ConfigError(_) | PhenoQcError::InvalidParameter { .. } => "config",
            PhenoQcError::DataError(_)
            | PhenoQcError::ColumnNotFound(_)
            | PhenoQcError::ShapeError { .. } => "data",
            PhenoQcError::TuningError(_) => "tuning",
            PhenoQcError::IoError(_) => "io",
            PhenoQcError::SerializationError(_) => "serialization",
            PhenoQcError::LoadError(_) => "load",
        }
    }

    /// Convert into a serializable marker for summaries
    pub fn to_marker(&self) -> ErrorMarker {
        ErrorMarker {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Recorded error, carried by summaries instead of being dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub kind: String,
    pub message: String,
}

impl From<serde_json::Error> for PhenoQcError {
    fn from(err: serde_json::Error) -> Self {
        PhenoQcError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for PhenoQcError {
    fn from(err: serde_yaml::Error) -> Self {
        PhenoQcError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PhenoQcError {
    fn from(err: ndarray::ShapeError) -> Self {
        PhenoQcError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for PhenoQcError {
    fn from(err: polars::error::PolarsError) -> Self {
        PhenoQcError::LoadError(err.to_string())
    }
}
