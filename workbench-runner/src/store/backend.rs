//! History storage backends
//!
//! A backend holds the raw bytes of the history document. The store owns
//! the format and the read-modify-write cycle; backends only read and
//! replace the whole document, and exclude other processes while a cycle
//! is in progress.

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

/// Exclusive hold on a history document, released when dropped
#[derive(Debug)]
pub struct HistoryLock {
    _file: Option<File>,
}

impl HistoryLock {
    /// A lock that excludes nothing outside the calling process
    pub fn process_local() -> Self {
        Self { _file: None }
    }
}

/// Durable storage for the serialized job history
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Reads the stored document
    ///
    /// # Returns
    /// `None` when nothing has been stored yet
    async fn read(&self) -> io::Result<Option<Vec<u8>>>;

    /// Replaces the stored document
    ///
    /// Implementations must not leave a truncated document behind if the
    /// write is interrupted.
    async fn write(&self, bytes: &[u8]) -> io::Result<()>;

    /// Waits until no other process holds the document, then holds it
    ///
    /// Backends that are never shared between processes keep the default.
    async fn lock(&self) -> io::Result<HistoryLock> {
        Ok(HistoryLock::process_local())
    }
}

/// File-backed history
///
/// Writes go to a uniquely named sibling file that is then renamed over the
/// document. Cross-process exclusion is an advisory lock on a `.lock`
/// sidecar next to the document.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The sidecar file the advisory lock is taken on
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("history"));
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Creates the document's directory and returns it
    async fn ensure_dir(&self) -> io::Result<PathBuf> {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                tokio::fs::create_dir_all(parent).await?;
                Ok(parent.to_path_buf())
            }
            None => Ok(PathBuf::from(".")),
        }
    }
}

#[async_trait]
impl HistoryBackend for FileBackend {
    async fn read(&self) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let dir = self.ensure_dir().await?;
        let path = self.path.clone();
        let data = bytes.to_vec();

        // Write atomically via a temp file unique to this writer
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut temp = NamedTempFile::new_in(&dir)?;
            temp.write_all(&data)?;
            temp.as_file().sync_all()?;
            temp.persist(&path)?;
            Ok(())
        })
        .await
        .map_err(io::Error::other)??;

        debug!("Wrote {} bytes of history to {}", bytes.len(), self.path.display());
        Ok(())
    }

    async fn lock(&self) -> io::Result<HistoryLock> {
        self.ensure_dir().await?;
        let lock_path = self.lock_path();

        let file = tokio::task::spawn_blocking(move || -> io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(io::Error::other)??;

        Ok(HistoryLock { _file: Some(file) })
    }
}

/// In-memory history, for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds `bytes`
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Mutex::new(Some(bytes.into())),
        }
    }

    /// Returns a copy of the stored document
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryBackend for MemoryBackend {
    async fn read(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.contents())
    }

    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        *self.contents.lock().unwrap() = Some(bytes.to_vec());
        Ok(())
    }
}
