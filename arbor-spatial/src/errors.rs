//! Error types for index and page-file operations.

use arbor::errors::{ArborError, ErrorKind};
use std::io;
use thiserror::Error;

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Page file is closed")]
    Closed,

    #[error("{0}")]
    Core(ArborError),
}

impl From<SpatialError> for ArborError {
    fn from(err: SpatialError) -> Self {
        match err {
            SpatialError::Io(io_err) => {
                ArborError::new(&format!("Spatial I/O error: {}", io_err), ErrorKind::IOError)
            }
            SpatialError::Serialization(msg) | SpatialError::InvalidFormat(msg) => {
                ArborError::new(&msg, ErrorKind::EncodingError)
            }
            SpatialError::InvalidOperation(msg) => ArborError::new(&msg, ErrorKind::InvalidOperation),
            SpatialError::Configuration(msg) => ArborError::new(&msg, ErrorKind::Configuration),
            SpatialError::InvariantViolation(msg) => {
                ArborError::new(&msg, ErrorKind::InvariantViolation)
            }
            SpatialError::Unsupported(msg) => ArborError::new(&msg, ErrorKind::Unsupported),
            SpatialError::Closed => {
                ArborError::new("Page file is closed", ErrorKind::InvalidOperation)
            }
            SpatialError::Core(err) => err,
        }
    }
}

impl From<ArborError> for SpatialError {
    fn from(err: ArborError) -> Self {
        match err.kind() {
            ErrorKind::Configuration => SpatialError::Configuration(err.message().to_string()),
            ErrorKind::InvariantViolation => {
                SpatialError::InvariantViolation(err.message().to_string())
            }
            ErrorKind::EncodingError => SpatialError::Serialization(err.message().to_string()),
            ErrorKind::Unsupported => SpatialError::Unsupported(err.message().to_string()),
            _ => SpatialError::Core(err),
        }
    }
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;
