//! Append-only audit trail.
//!
//! Every run, successful, crashed or cancelled, appends one
//! [`AuditRecord`]. Appends are a channel send and never block the run; a
//! single writer task drains the channel into an [`AuditSink`], so records
//! from concurrent runs never interleave.
//!
//! A process-wide logger can be installed once with [`init_global`] and
//! flushed at shutdown with [`shutdown_global`].

mod record;
mod sink;

pub use record::{digest, AuditRecord, RunOutcome, StageRecord, StageStatus};
pub use sink::{AuditSink, JsonlFileAuditSink, MemoryAuditSink};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors from the audit trail.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit logger is shut down")]
    Closed,

    #[error("Global audit logger already initialized")]
    AlreadyInitialized,
}

enum Command {
    Append(Box<AuditRecord>),
    Flush(oneshot::Sender<Result<(), AuditError>>),
}

/// Channel-fed audit logger with one writer task.
pub struct AuditLogger {
    tx: mpsc::UnboundedSender<Command>,
    closed: AtomicBool,
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    /// Start a logger writing to `sink`.
    ///
    /// Must be called inside a tokio runtime; the writer task is spawned here.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(rx, sink.clone()));
        Self {
            tx,
            closed: AtomicBool::new(false),
            sink,
        }
    }

    /// Logger backed by a [`MemoryAuditSink`], returned alongside it.
    pub fn in_memory() -> (Self, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        (Self::new(sink.clone()), sink)
    }

    /// Queue a record. Never waits for the write.
    pub fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AuditError::Closed);
        }
        self.tx
            .send(Command::Append(Box::new(record)))
            .map_err(|_| AuditError::Closed)
    }

    /// Wait until every record queued before this call is written.
    pub async fn flush(&self) -> Result<(), AuditError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack))
            .map_err(|_| AuditError::Closed)?;
        done.await.map_err(|_| AuditError::Closed)?
    }

    /// Refuse further appends and flush what is queued.
    pub async fn shutdown(&self) -> Result<(), AuditError> {
        self.closed.store(true, Ordering::Release);
        self.flush().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn sink(&self) -> &Arc<dyn AuditSink> {
        &self.sink
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn write_loop(mut rx: mpsc::UnboundedReceiver<Command>, sink: Arc<dyn AuditSink>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Append(record) => {
                if let Err(e) = sink.write(&record).await {
                    tracing::error!(run_id = %record.run_id, error = %e, "Audit write failed");
                }
            }
            Command::Flush(ack) => {
                let _ = ack.send(sink.flush().await);
            }
        }
    }
}

static GLOBAL: OnceLock<Arc<AuditLogger>> = OnceLock::new();

/// Install the process-wide logger. Only the first call succeeds.
pub fn init_global(logger: AuditLogger) -> Result<Arc<AuditLogger>, AuditError> {
    let logger = Arc::new(logger);
    GLOBAL
        .set(logger.clone())
        .map_err(|_| AuditError::AlreadyInitialized)?;
    Ok(logger)
}

/// The process-wide logger, if installed.
pub fn global() -> Option<Arc<AuditLogger>> {
    GLOBAL.get().cloned()
}

/// Flush and close the process-wide logger. A no-op when none is installed.
pub async fn shutdown_global() -> Result<(), AuditError> {
    match GLOBAL.get() {
        Some(logger) => logger.shutdown().await,
        None => Ok(()),
    }
}
