//! Per-source notification workers.
//!
//! Each notification source gets one worker task consuming a bounded
//! channel, so batches from a source apply strictly in order. A failed
//! batch backs off for a fixed delay, then falls back to a full refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::errors::{CacheError, Result};
use crate::router::CacheRouter;

/// Control payload: refresh every cache instead of applying statements.
pub const REFRESH_PAYLOAD: &str = "REFRESH";

/// Control payload: stop the worker after draining queued payloads.
///
/// Only this worker task stops; an embedder that treats the source's stop
/// as fatal is expected to exit once [`NotificationWorker::shutdown`]
/// returns.
pub const STOP_PAYLOAD: &str = "STOP";

const PER_SOURCE_BUFFER: usize = 128;

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Delay before the full refresh that follows a failed batch.
    pub retry_delay: Duration,
}

pub const DEFAULT_WORKER_CONFIG: WorkerConfig = WorkerConfig {
    retry_delay: Duration::from_secs(5),
};

impl Default for WorkerConfig {
    fn default() -> Self {
        DEFAULT_WORKER_CONFIG
    }
}

/// Handle to one source's worker task.
#[derive(Debug)]
pub struct NotificationWorker {
    source: String,
    send: mpsc::Sender<String>,
    handle: JoinHandle<()>,
}

impl NotificationWorker {
    pub fn spawn(
        router: Arc<CacheRouter>,
        source: impl Into<String>,
        config: WorkerConfig,
    ) -> NotificationWorker {
        let source = source.into();
        let (send, recv) = mpsc::channel(PER_SOURCE_BUFFER);
        let handle = tokio::spawn(run(router, source.clone(), config, recv));
        NotificationWorker {
            source,
            send,
            handle,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Queue a notification payload, waiting for buffer space.
    pub async fn post(&self, payload: impl Into<String>) -> Result<()> {
        self.send
            .send(payload.into())
            .await
            .map_err(|_| CacheError::ChannelClosed(self.source.clone()))
    }

    /// Queue a payload without waiting; fails when the buffer is full.
    pub fn try_post(&self, payload: impl Into<String>) -> Result<()> {
        self.send
            .try_send(payload.into())
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => {
                    CacheError::WorkerOverload(self.source.clone())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    CacheError::ChannelClosed(self.source.clone())
                }
            })
    }

    /// Stop the worker and wait for it to finish queued work.
    pub async fn shutdown(self) {
        let _ = self.send.send(STOP_PAYLOAD.to_string()).await;
        let _ = self.handle.await;
    }
}

async fn run(
    router: Arc<CacheRouter>,
    source: String,
    config: WorkerConfig,
    mut recv: mpsc::Receiver<String>,
) {
    debug!(%source, "notification worker started");
    let mut sequence: u64 = 0;
    while let Some(payload) = recv.recv().await {
        match payload.trim() {
            STOP_PAYLOAD => break,
            REFRESH_PAYLOAD => {
                debug!(%source, "refresh requested");
                router.refresh_all();
            }
            _ => {
                sequence += 1;
                if let Err(e) = router.apply_batch(&source, sequence, &payload).await {
                    error!(
                        %source,
                        sequence,
                        error = %e,
                        "notification batch failed, falling back to full refresh"
                    );
                    tokio::time::sleep(config.retry_delay).await;
                    router.refresh_all();
                }
            }
        }
    }
    debug!(%source, "notification worker stopped");
}
