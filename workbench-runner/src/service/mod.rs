//! Service layer
//!
//! Shared state that outlives a single supervisor call and is read by the
//! caller while a run is in progress.

pub mod diagnostics;

pub use diagnostics::{CANCEL_NOTICE, DiagnosticBuffer};
