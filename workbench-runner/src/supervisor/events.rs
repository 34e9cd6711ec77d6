//! Run events pushed to the caller

use std::path::PathBuf;
use workbench_core::domain::job::JobStatus;

/// Something that happened during a run
///
/// `StatusChanged(Running)` is always the first event of a run and
/// `Finished` always the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    StatusChanged(JobStatus),
    /// A chunk of the process's standard output
    Stdout(String),
    /// A chunk of the process's standard error
    Stderr(String),
    /// The model's own log file was found
    LogfileDiscovered(PathBuf),
    /// No log file appeared in time; the run continues without one
    LogfileUnavailable,
    Finished {
        status: JobStatus,
        exit_code: Option<i32>,
    },
}
