//! Workbench Runner
//!
//! Launches model runs and remembers them.
//!
//! Architecture:
//! - Configuration: executable, scratch and history locations, pass-through settings
//! - Supervisor: one task per run owning the model process and its job record
//! - Services: diagnostic text shared between a run and its caller
//! - Store: bounded, deduplicated job history over a pluggable backend

pub mod config;
pub mod error;
pub mod service;
pub mod store;
pub mod supervisor;

pub use config::Config;
pub use error::{StoreError, SupervisorError};
pub use service::DiagnosticBuffer;
pub use store::backend::{FileBackend, HistoryBackend, HistoryLock, MemoryBackend};
pub use store::{HistoryEntry, JobStore, LoadReport};
pub use supervisor::{Canceller, JobEvent, ProcessSupervisor, RunHandle, build_invocation, find_most_recent_logfile};
