//! Error types for VecBatch core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for dataset I/O
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot open dataset {}: {reason}", path.display())]
    DatasetOpen { path: PathBuf, reason: String },

    #[error("cannot create dataset {}: {reason}", path.display())]
    DatasetCreate { path: PathBuf, reason: String },

    #[error("malformed record at line {line} of {}: {reason}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("attribute count mismatch: schema has {expected} fields, record has {actual}")]
    AttributeCountMismatch { expected: usize, actual: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
