use super::model::{CompletionRecord, InFlightSnapshot, PoolSize, QueueRecord, RecordIndex};
use super::RecordStore;
use crate::core::errors::{QueueError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const QUEUE_DIR: &str = "queue";
const COMPLETED_DIR: &str = "completed";
const POOL_SIZE_FILE: &str = "pool_size.json";
const LATEST_POOL_FILE: &str = "latest_pool.json";

/// Paths making up one queue directory
///
/// ```text
/// <queue>/
///   queue/<index>                              raw command text
///   completed/<ts>_<index>_completed.json      completion records
///   pool_size.json                             {"size": k}
///   latest_pool.json                           in-flight snapshot
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLayout {
    root: PathBuf,
}

impl QueueLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout of queue `name` inside a directory holding many queues
    pub fn named(queues_dir: impl AsRef<Path>, name: &str) -> Self {
        Self::new(queues_dir.as_ref().join(name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.root.join(QUEUE_DIR)
    }

    pub fn completed_dir(&self) -> PathBuf {
        self.root.join(COMPLETED_DIR)
    }

    pub fn pending_path(&self, index: RecordIndex) -> PathBuf {
        self.queue_dir().join(index.to_string())
    }

    pub fn pool_size_path(&self) -> PathBuf {
        self.root.join(POOL_SIZE_FILE)
    }

    pub fn latest_pool_path(&self) -> PathBuf {
        self.root.join(LATEST_POOL_FILE)
    }
}

/// Directory-backed record store
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    layout: QueueLayout,
}

impl FsRecordStore {
    pub fn new(layout: QueueLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &QueueLayout {
        &self.layout
    }
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn pending_indices(&self) -> Result<Vec<RecordIndex>> {
        let dir = self.layout.queue_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(QueueError::io("read queue directory", &dir, e)),
        };

        let mut indices = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| QueueError::io("read queue directory", &dir, e))?
        {
            let name = entry.file_name();
            // Only canonical decimal names; "007" would never match pending_path(7)
            let index = name.to_str().and_then(|n| {
                n.parse::<RecordIndex>()
                    .ok()
                    .filter(|index| index.to_string() == n)
            });
            match index {
                Some(index) => indices.push(index),
                None => debug!(entry = ?name, "Ignoring non-index entry in queue directory"),
            }
        }
        Ok(indices)
    }

    async fn read_pending(&self, index: RecordIndex) -> Result<Option<String>> {
        let path = self.layout.pending_path(index);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(QueueError::io("read queue record", &path, e)),
        }
    }

    async fn write_pending(&self, record: &QueueRecord) -> Result<()> {
        let path = self.layout.pending_path(record.index);
        write_bytes(&path, record.content.as_bytes(), "write queue record").await
    }

    async fn remove_pending(&self, index: RecordIndex) -> Result<bool> {
        let path = self.layout.pending_path(index);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(QueueError::io("remove queue record", &path, e)),
        }
    }

    async fn write_completion(&self, record: &CompletionRecord) -> Result<PathBuf> {
        let path = self.layout.completed_dir().join(record.file_name());
        write_json(&path, record).await?;
        Ok(path)
    }

    async fn completions(&self) -> Result<Vec<CompletionRecord>> {
        let dir = self.layout.completed_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(QueueError::io("read completed directory", &dir, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| QueueError::io("read completed directory", &dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        // Fixed-width timestamp prefix, so name order is time order
        paths.sort();

        let mut records: Vec<CompletionRecord> = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(record) = read_json(&path).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn read_pool_size(&self) -> Result<Option<PoolSize>> {
        read_json(&self.layout.pool_size_path()).await
    }

    async fn write_pool_size(&self, size: PoolSize) -> Result<()> {
        write_json(&self.layout.pool_size_path(), &size).await
    }

    async fn read_in_flight(&self) -> Result<Option<InFlightSnapshot>> {
        read_json(&self.layout.latest_pool_path()).await
    }

    async fn write_in_flight(&self, snapshot: &InFlightSnapshot) -> Result<()> {
        write_json(&self.layout.latest_pool_path(), snapshot).await
    }

    fn pool_size_path(&self) -> PathBuf {
        self.layout.pool_size_path()
    }
}

async fn write_bytes(path: &Path, bytes: &[u8], operation: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| QueueError::io("create directory", parent, e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| QueueError::io(operation, path, e))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| QueueError::json(path, e))?;
    write_bytes(path, &bytes, "write json record").await
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(QueueError::io("read json record", path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| QueueError::json(path, e))
}
