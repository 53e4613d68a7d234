//! Background persistence writer.
//!
//! Step records and status transitions are queued on a bounded channel and
//! applied by one dedicated worker, so a single run's writes land in
//! submission order. Step logging never blocks the caller: when the queue
//! is full the record is dropped and counted. Status transitions wait for
//! queue space and are retried with backoff by the worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use flowhands_protocols::error::PersistenceError;
use flowhands_protocols::record::{StatusUpdate, StepCompletion, StepRecord};
use flowhands_protocols::store::{FlowStore, RunStore};

use crate::retry::RetryConfig;

/// Writer configuration.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Bounded queue size.
    pub queue_capacity: usize,
    /// Backoff applied by the worker to failed writes.
    pub retry: RetryConfig,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            retry: RetryConfig::default(),
        }
    }
}

enum WriteCommand {
    AppendStep(StepRecord),
    CompleteStep(StepCompletion),
    UpdateStatus {
        run_id: String,
        update: StatusUpdate,
    },
    Flush(oneshot::Sender<()>),
}

impl WriteCommand {
    fn label(&self) -> &'static str {
        match self {
            WriteCommand::AppendStep(_) => "append_step",
            WriteCommand::CompleteStep(_) => "complete_step",
            WriteCommand::UpdateStatus { .. } => "update_run_status",
            WriteCommand::Flush(_) => "flush",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    applied: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    retried: AtomicU64,
}

/// Point-in-time writer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    /// Writes applied to the store.
    pub applied: u64,
    /// Writes abandoned after exhausting retries or failing permanently.
    pub failed: u64,
    /// Step writes discarded because the queue was full.
    pub dropped: u64,
    /// Retry attempts spent.
    pub retried: u64,
}

/// Handle to the writer worker. Cheap to clone.
#[derive(Clone)]
pub struct PersistenceWriter {
    tx: mpsc::Sender<WriteCommand>,
    counters: Arc<Counters>,
}

impl PersistenceWriter {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(store: Arc<dyn FlowStore>, config: WriterConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        tokio::spawn(run_worker(store, config.retry, rx, counters.clone()));

        Self { tx, counters }
    }

    /// Queue a started step record. Never blocks; returns `false` when the
    /// record was dropped.
    pub fn try_log_step(&self, step: StepRecord) -> bool {
        self.try_submit(WriteCommand::AppendStep(step))
    }

    /// Queue a step completion. Never blocks; returns `false` when the
    /// record was dropped.
    pub fn try_complete_step(&self, completion: StepCompletion) -> bool {
        self.try_submit(WriteCommand::CompleteStep(completion))
    }

    /// Queue a status transition, waiting for queue space.
    pub async fn update_status(
        &self,
        run_id: impl Into<String>,
        update: StatusUpdate,
    ) -> Result<(), PersistenceError> {
        self.tx
            .send(WriteCommand::UpdateStatus {
                run_id: run_id.into(),
                update,
            })
            .await
            .map_err(|_| PersistenceError::QueueClosed)
    }

    /// Queue a status transition from a synchronous context such as a drop
    /// guard. When the queue is full the send is moved onto a task.
    pub fn try_update_status(&self, run_id: impl Into<String>, update: StatusUpdate) {
        let command = WriteCommand::UpdateStatus {
            run_id: run_id.into(),
            update,
        };
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let tx = self.tx.clone();
                        handle.spawn(async move {
                            if tx.send(command).await.is_err() {
                                warn!("Writer closed before status update could be queued");
                            }
                        });
                    }
                    Err(_) => {
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("No runtime available, dropping status update");
                    }
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Writer closed, dropping status update");
            }
        }
    }

    /// Wait until every write queued before this call has been handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            applied: self.counters.applied.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
        }
    }

    fn try_submit(&self, command: WriteCommand) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(command)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Persistence queue full, dropping {} (dropped so far: {})",
                    command.label(),
                    dropped
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Writer closed, dropping {}", command.label());
                false
            }
        }
    }
}

async fn run_worker(
    store: Arc<dyn FlowStore>,
    retry: RetryConfig,
    mut rx: mpsc::Receiver<WriteCommand>,
    counters: Arc<Counters>,
) {
    debug!("Persistence writer started (store: {})", store.id());

    while let Some(command) = rx.recv().await {
        let label = command.label();
        let store = &store;
        let (result, retries) = match command {
            WriteCommand::Flush(done) => {
                let _ = done.send(());
                continue;
            }
            WriteCommand::AppendStep(step) => {
                let step = &step;
                retry.run(label, move || store.append_step(step)).await
            }
            WriteCommand::CompleteStep(completion) => {
                let completion = &completion;
                retry
                    .run(label, move || store.complete_step(completion))
                    .await
            }
            WriteCommand::UpdateStatus { run_id, update } => {
                let (run_id, update) = (&run_id, &update);
                retry
                    .run(label, move || store.update_run_status(run_id, update))
                    .await
            }
        };

        counters
            .retried
            .fetch_add(u64::from(retries), Ordering::Relaxed);
        match result {
            Ok(()) => {
                counters.applied.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("Persistence write {} failed: {}", label, e);
            }
        }
    }

    debug!("Persistence writer stopped");
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
