//! Storage backends for wholesale namespaced records.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Storage layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request not found: {0}")]
    RequestNotFound(String),

    #[error("pattern not found: {0}")]
    PatternNotFound(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A key-value store of whole-collection JSON documents.
///
/// There is no partial-key addressing: callers read a record, mutate the
/// decoded collection in memory and write the full document back.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read a record; `None` when the record has never been written.
    async fn read(&self, record: &str) -> Result<Option<String>, StoreError>;

    /// Replace a record wholesale.
    async fn write(&self, record: &str, payload: &str) -> Result<(), StoreError>;
}

/// File-backed storage: one `<record>.json` document per record under a
/// state directory.
pub struct FileBackend {
    base_dir: PathBuf,
}

impl FileBackend {
    /// Create a file backend rooted at `base_dir`, creating it if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn record_path(&self, record: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", record))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read(&self, record: &str) -> Result<Option<String>, StoreError> {
        let path = self.record_path(record);
        match tokio::fs::read_to_string(&path).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, record: &str, payload: &str) -> Result<(), StoreError> {
        let path = self.record_path(record);
        tokio::fs::write(&path, payload).await?;
        debug!(record, bytes = payload.len(), "wrote storage record");
        Ok(())
    }
}

/// In-memory storage for tests and embedding.
#[derive(Default)]
pub struct MemoryBackend {
    records: DashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, record: &str) -> Result<Option<String>, StoreError> {
        Ok(self.records.get(record).map(|r| r.value().clone()))
    }

    async fn write(&self, record: &str, payload: &str) -> Result<(), StoreError> {
        self.records.insert(record.to_string(), payload.to_string());
        Ok(())
    }
}
