//! Background queue worker.
//!
//! Callers talk to it only through [`WorkerHandle::post_message`], a
//! fire-and-forget send with no acknowledgement. The wire shape of a message
//! is `{"type": "PROCESS_QUEUE"}`.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::persistence::UploadPersistence;
use crate::upload::{BatchReport, BatchUploader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Replay every pending upload session
    ProcessQueue,
    /// Finish the current message and stop
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerHandle {
    pub fn post_message(&self, message: WorkerMessage) {
        if self.tx.send(message).is_err() {
            debug!(?message, "queue worker is gone, message dropped");
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub runs: usize,
    pub uploaded: usize,
    pub failed: usize,
}

pub struct QueueWorker {
    uploader: BatchUploader,
    persistence: UploadPersistence,
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
    stats: WorkerStats,
}

impl QueueWorker {
    /// Starts the worker on the current tokio runtime. It runs until it gets
    /// `Shutdown` or every handle is dropped.
    pub fn spawn(
        uploader: BatchUploader,
        persistence: UploadPersistence,
    ) -> (WorkerHandle, JoinHandle<WorkerStats>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = QueueWorker {
            uploader: uploader.with_persistence(persistence.clone()),
            persistence,
            rx,
            stats: WorkerStats::default(),
        };
        (WorkerHandle { tx }, tokio::spawn(worker.run()))
    }

    async fn run(mut self) -> WorkerStats {
        while let Some(message) = self.rx.recv().await {
            match message {
                WorkerMessage::ProcessQueue => {
                    let reports = process_queue(&self.uploader, &self.persistence).await;
                    self.stats.runs += 1;
                    for report in &reports {
                        self.stats.uploaded += report.succeeded();
                        self.stats.failed += report.failed();
                    }
                }
                WorkerMessage::Shutdown => break,
            }
        }
        debug!(stats = ?self.stats, "queue worker stopped");
        self.stats
    }
}

async fn process_queue(
    uploader: &BatchUploader,
    persistence: &UploadPersistence,
) -> Vec<BatchReport> {
    match persistence.clear_expired() {
        Ok(0) => {}
        Ok(n) => info!(expired = n, "dropped expired upload sessions"),
        Err(e) => warn!(error = %e, "could not purge expired upload sessions"),
    }

    let sessions = match persistence.pending_sessions() {
        Ok(sessions) => sessions,
        Err(e) => {
            warn!(error = %e, "could not read pending upload sessions");
            return Vec::new();
        }
    };

    let mut reports = Vec::with_capacity(sessions.len());
    for session in &sessions {
        reports.push(uploader.resume_session(session).await);
    }
    reports
}
