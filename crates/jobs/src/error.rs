//! Error types for batch jobs.

use std::path::PathBuf;
use thiserror::Error;

use vecbatch_core::GeometryType;

/// Fatal job errors. Soft per-file and per-group failures never show up
/// here; they are accumulated in the job's report instead.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("no usable input datasets")]
    EmptyInput,

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("cannot delete existing output {}: {reason}", path.display())]
    OutputDelete { path: PathBuf, reason: String },

    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("external command `{program}` failed: {reason}")]
    Command { program: String, reason: String },

    #[error("a job is already running")]
    AlreadyRunning,

    #[error("job worker panicked")]
    WorkerPanicked,

    #[error("no datasets with geometry type {geometry} in {}", dir.display())]
    NoMatchingInputs { dir: PathBuf, geometry: GeometryType },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset error: {0}")]
    Core(#[from] vecbatch_core::Error),
}

/// Result alias for job operations.
pub type Result<T> = std::result::Result<T, JobError>;
