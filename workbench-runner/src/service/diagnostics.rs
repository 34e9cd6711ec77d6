//! Diagnostic buffer
//!
//! Collects a running model's standard-error text. This is auxiliary text
//! from the process or its launcher, kept apart from the model's own log
//! file, and readable by the caller at any time during or after the run.

use std::sync::{Arc, Mutex};

/// Diagnostic text left behind by a user-initiated cancel
pub const CANCEL_NOTICE: &str = "Run Canceled";

/// Thread-safe accumulator for standard-error output
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBuffer {
    buffer: Arc<Mutex<String>>,
}

impl DiagnosticBuffer {
    /// Creates an empty diagnostic buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of output
    ///
    /// # Arguments
    /// * `text` - The chunk exactly as read from the stream
    pub fn append(&self, text: &str) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.push_str(text);
    }

    /// Discards everything collected so far and stores `text` instead
    pub fn replace(&self, text: impl Into<String>) {
        let mut buffer = self.buffer.lock().unwrap();
        *buffer = text.into();
    }

    /// Returns a copy of the collected text
    pub fn contents(&self) -> String {
        self.buffer.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().unwrap().is_empty()
    }
}
