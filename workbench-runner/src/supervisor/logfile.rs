//! Model log file discovery
//!
//! A model writes its structured log to `InVEST-<model>-log-<timestamp>.txt`
//! in its workspace. The file does not exist when the process starts, so it
//! is looked for only once the process has produced output, and only for a
//! bounded time.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::{debug, warn};

const LOGFILE_PREFIX: &str = "InVEST-";
const LOGFILE_MARKER: &str = "-log-";
const LOGFILE_SUFFIX: &str = ".txt";

/// Whether `name` looks like a model log file name
pub fn is_model_logfile(name: &str) -> bool {
    name.starts_with(LOGFILE_PREFIX) && name.contains(LOGFILE_MARKER) && name.ends_with(LOGFILE_SUFFIX)
}

/// Finds the most recently modified model log file in `dir`
///
/// Files modified before `not_before` are ignored, which keeps the log of a
/// previous run in the same workspace from being picked up.
///
/// # Returns
/// `None` if no matching file exists (including when `dir` does not exist)
pub async fn find_most_recent_logfile(dir: &Path, not_before: SystemTime) -> io::Result<Option<PathBuf>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut best: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name();
        if !name.to_str().is_some_and(is_model_logfile) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => continue,
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified < not_before {
            continue;
        }

        if best.as_ref().is_none_or(|(time, _)| modified > *time) {
            best = Some((modified, entry.path()));
        }
    }

    Ok(best.map(|(_, path)| path))
}

/// Polls `dir` until a log file appears or `timeout` elapses
pub(crate) async fn discover_logfile(
    dir: &Path,
    not_before: SystemTime,
    timeout: Duration,
    poll_interval: Duration,
) -> Option<PathBuf> {
    let deadline = Instant::now() + timeout;

    loop {
        match find_most_recent_logfile(dir, not_before).await {
            Ok(Some(path)) => return Some(path),
            Ok(None) => {}
            Err(e) => warn!("Failed to scan {} for a log file: {}", dir.display(), e),
        }

        if Instant::now() + poll_interval > deadline {
            debug!("No log file appeared in {} within {:?}", dir.display(), timeout);
            return None;
        }
        tokio::time::sleep(poll_interval).await;
    }
}
