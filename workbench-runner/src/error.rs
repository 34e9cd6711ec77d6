//! Error types for the runner

use std::path::PathBuf;
use thiserror::Error;
use workbench_core::datastack::DatastackError;

/// Errors that prevent a run from starting or a cancel from being delivered
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// One or more arguments are invalid or were never validated
    #[error("Arguments failed validation: {}", .invalid.join(", "))]
    ValidationFailed { invalid: Vec<String> },

    /// The validation results were computed for different argument values
    #[error("Validation results are out of date; validate again before running")]
    StaleValidation,

    #[error("Job is already running")]
    AlreadyRunning,

    #[error("Job has no workspace directory")]
    MissingWorkspace,

    /// The datastack could not be encoded
    #[error(transparent)]
    Datastack(#[from] DatastackError),

    /// The scratch directory or datastack file could not be written
    #[error("Failed to prepare {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model process could not be created
    #[error("Failed to spawn {executable}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The process tree could not be signalled
    #[error("Failed to terminate process {pid}: {message}")]
    Terminate { pid: u32, message: String },
}

/// Errors raised by the job history store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode history: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Jobs without a workspace directory have no identity
    #[error("Job for model {model_run_name} has no workspace directory")]
    MissingIdentity { model_run_name: String },
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
