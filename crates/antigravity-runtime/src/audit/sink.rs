//! Audit sinks for storing run records.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::record::AuditRecord;
use super::AuditError;

/// Destination for audit records.
///
/// Sinks are driven by the logger's single writer task, so `write` is never
/// called concurrently by the logger itself.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError>;

    /// Flush any buffered records
    async fn flush(&self) -> Result<(), AuditError>;

    /// Records written through this sink
    async fn entry_count(&self) -> u64;
}

/// In-memory audit sink for tests and embedding.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }

    async fn entry_count(&self) -> u64 {
        self.records.read().len() as u64
    }
}

/// Append-only JSONL file, one record per line.
pub struct JsonlFileAuditSink {
    path: PathBuf,
    written: AtomicU64,
}

impl JsonlFileAuditSink {
    /// Create the sink, creating parent directories if needed.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            written: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in the file, including ones from earlier processes.
    pub async fn read_all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        Ok(records)
    }
}

#[async_trait]
impl AuditSink for JsonlFileAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        // One write_all per record keeps each line whole
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn flush(&self) -> Result<(), AuditError> {
        // Flushed on every write
        Ok(())
    }

    async fn entry_count(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for JsonlFileAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlFileAuditSink")
            .field("path", &self.path)
            .finish()
    }
}
