//! Job history store
//!
//! Durable, bounded, deduplicated history of jobs. Entries are kept
//! most-recent-first and are unique by workspace hash; the hash is computed
//! once when a job is stored and written next to it.
//!
//! Every read-modify-write cycle holds the store's in-process write lock and
//! the backend's cross-process lock, so concurrent completions from
//! independent runs, in this process or another, never interleave. Loading is tolerant:
//! unreadable entries are skipped with a warning and never fail the load.

pub mod backend;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use workbench_core::domain::job::{JobRecord, WorkspaceHash};

use crate::error::{StoreError, StoreResult};
use backend::{FileBackend, HistoryBackend};

const FORMAT_VERSION: u32 = 1;
const HUMAN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A stored job together with the identity it was stored under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub workspace_hash: WorkspaceHash,
    pub job: JobRecord,
}

/// Outcome of reading the history, including how much was dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Usable entries, most recent first
    pub entries: Vec<HistoryEntry>,
    /// Entries that could not be used (corrupt, missing identity, duplicate)
    pub skipped: usize,
}

impl LoadReport {
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.entries.iter().map(|entry| entry.job.clone()).collect()
    }
}

#[derive(Serialize)]
struct HistoryDocument<'a> {
    version: u32,
    entries: &'a [HistoryEntry],
}

struct Inner {
    backend: Box<dyn HistoryBackend>,
    capacity: usize,
    /// Held for the whole of every write cycle
    write_lock: Mutex<()>,
}

/// Handle to the job history
///
/// Clones share the same backend and write lock.
#[derive(Clone)]
pub struct JobStore {
    inner: Arc<Inner>,
}

impl JobStore {
    /// Creates a store over an arbitrary backend
    ///
    /// # Arguments
    /// * `backend` - Where the history document lives
    /// * `capacity` - Maximum number of entries kept; older ones are evicted
    pub fn new(backend: impl HistoryBackend + 'static, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend: Box::new(backend),
                capacity,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Creates a store backed by the history file at `path`
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self::new(FileBackend::new(path), capacity)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Reads the history, most recent first
    ///
    /// Only a failure to read the backend itself is an error; corrupt
    /// content yields whatever entries are still usable.
    pub async fn load(&self) -> StoreResult<Vec<JobRecord>> {
        Ok(self.load_report().await?.jobs())
    }

    /// Reads the history along with the number of entries that were skipped
    pub async fn load_report(&self) -> StoreResult<LoadReport> {
        let bytes = self.inner.backend.read().await?;
        Ok(self.parse(bytes.as_deref()))
    }

    /// Stores `job`, promoting it to most recent
    ///
    /// Any entry with the same workspace hash is replaced; the oldest entries
    /// beyond capacity are evicted. The caller's record is not modified.
    ///
    /// # Returns
    /// The history after the write, most recent first
    pub async fn upsert(&self, job: &JobRecord) -> StoreResult<Vec<JobRecord>> {
        let workspace_hash = job
            .workspace_hash()
            .ok_or_else(|| StoreError::MissingIdentity {
                model_run_name: job.model_run_name.clone(),
            })?;

        let _guard = self.inner.write_lock.lock().await;
        let _lock = self.inner.backend.lock().await?;

        let mut entries = self.load_report().await?.entries;
        entries.retain(|entry| entry.workspace_hash != workspace_hash);

        let mut stored = job.clone();
        stored.nav_id = None;
        stored.human_time = Some(Local::now().format(HUMAN_TIME_FORMAT).to_string());

        debug!(
            "Storing job {} ({}) with status {}",
            workspace_hash, stored.model_run_name, stored.status
        );
        entries.insert(
            0,
            HistoryEntry {
                workspace_hash,
                job: stored,
            },
        );
        entries.truncate(self.inner.capacity);

        self.write(&entries).await?;
        Ok(entries.into_iter().map(|entry| entry.job).collect())
    }

    /// Discards all stored history
    ///
    /// Records already loaded into memory are independent copies and are
    /// unaffected.
    pub async fn clear(&self) -> StoreResult<Vec<JobRecord>> {
        let _guard = self.inner.write_lock.lock().await;
        let _lock = self.inner.backend.lock().await?;
        self.write(&[]).await?;
        info!("Cleared job history");
        Ok(Vec::new())
    }

    async fn write(&self, entries: &[HistoryEntry]) -> StoreResult<()> {
        let document = HistoryDocument {
            version: FORMAT_VERSION,
            entries,
        };
        let bytes = serde_json::to_vec_pretty(&document)?;
        self.inner.backend.write(&bytes).await?;
        Ok(())
    }

    fn parse(&self, bytes: Option<&[u8]>) -> LoadReport {
        let Some(bytes) = bytes.filter(|b| !b.iter().all(u8::is_ascii_whitespace)) else {
            return LoadReport::default();
        };

        let document: JsonValue = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!("Job history is unreadable, starting empty: {}", e);
                return LoadReport::default();
            }
        };

        let Some(raw_entries) = document.get("entries").and_then(JsonValue::as_array) else {
            warn!("Job history has no entry list, starting empty");
            return LoadReport::default();
        };

        let mut report = LoadReport::default();
        for (index, raw) in raw_entries.iter().enumerate() {
            match parse_entry(raw) {
                Ok(entry) => {
                    if report
                        .entries
                        .iter()
                        .any(|e| e.workspace_hash == entry.workspace_hash)
                    {
                        warn!("Skipping duplicate history entry {} ({})", index, entry.workspace_hash);
                        report.skipped += 1;
                    } else {
                        report.entries.push(entry);
                    }
                }
                Err(reason) => {
                    warn!("Skipping corrupt history entry {}: {}", index, reason);
                    report.skipped += 1;
                }
            }
        }

        if report.entries.len() > self.inner.capacity {
            report.skipped += report.entries.len() - self.inner.capacity;
            report.entries.truncate(self.inner.capacity);
        }

        report
    }
}

fn parse_entry(raw: &JsonValue) -> std::result::Result<HistoryEntry, String> {
    let entry: HistoryEntry = serde_json::from_value(raw.clone()).map_err(|e| e.to_string())?;

    if entry.workspace_hash.as_str().is_empty() {
        return Err("empty workspace hash".to_string());
    }
    if entry.job.model_run_name.trim().is_empty() {
        return Err("missing model run name".to_string());
    }
    if entry.job.workspace.directory.is_none() {
        return Err("missing workspace directory".to_string());
    }

    Ok(entry)
}
