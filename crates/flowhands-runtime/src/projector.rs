//! Streaming projector.
//!
//! Wraps a driver as a lazy, finite stream of [`ProjectedEvent`]s. While
//! events flow, step records are handed to the persistence writer without
//! waiting; once the driver finishes, the run outcome is recorded and
//! flushed, and a final `done` item closes the stream.
//!
//! Dropping the stream before `done` cancels the run: the driver is dropped
//! with it and never advanced again, and the run is marked `cancelled` with
//! the number of items the consumer received.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::Utc;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use flowhands_core::flow::ErasedDriver;
use flowhands_core::scheduler::DriveResult;
use flowhands_protocols::observable::ObservableEvent;
use flowhands_protocols::record::{
    RunStatus, StatusUpdate, StepCompletion, StepRecord, SuspensionRecord, SuspensionStatus,
};
use flowhands_protocols::store::{FlowStore, SuspensionStore};
use flowhands_store::PersistenceWriter;

use crate::outcome::{DoneEvent, ProjectedEvent, RunOutcome, StreamItem, SuspensionDescriptor};
use crate::truncate::Truncation;

/// Where and how a projected run is recorded.
#[derive(Clone)]
pub struct Projection {
    pub run_id: String,
    pub flow_id: String,
    pub session_id: Option<String>,
    pub store: Arc<dyn FlowStore>,
    pub writer: PersistenceWriter,
    /// Limits for persisted step payloads.
    pub persist_limits: Truncation,
    /// Limits for streamed event payloads.
    pub stream_limits: Truncation,
}

/// Observable stream of one run.
pub struct ProjectedStream {
    run_id: String,
    inner: Pin<Box<dyn Stream<Item = ProjectedEvent> + Send>>,
    outcome: Arc<Mutex<Option<RunOutcome>>>,
}

impl ProjectedStream {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The run outcome, available once `done` has been yielded.
    pub fn take_outcome(&self) -> Option<RunOutcome> {
        self.outcome.lock().take()
    }

    /// Consume every item and return the outcome.
    pub async fn drain(mut self) -> Option<RunOutcome> {
        while self.next().await.is_some() {}
        self.take_outcome()
    }
}

impl Stream for ProjectedStream {
    type Item = ProjectedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

/// Marks the run cancelled unless disarmed before it drops.
struct CancelGuard {
    writer: PersistenceWriter,
    run_id: String,
    yielded: u32,
    armed: bool,
}

impl CancelGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        info!(
            run_id = %self.run_id,
            cancelled_at_step = self.yielded,
            "Stream dropped before completion, cancelling run"
        );
        self.writer.try_update_status(
            &self.run_id,
            StatusUpdate::new(RunStatus::Cancelled)
                .with_metadata("cancelled_at_step", json!(self.yielded))
                .with_metadata("cancelled_at", json!(Utc::now().to_rfc3339())),
        );
    }
}

/// Project a driver into an observable, persisted stream.
pub fn project(mut driver: Box<dyn ErasedDriver>, projection: Projection) -> ProjectedStream {
    let run_id = projection.run_id.clone();
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);

    // Created outside the generator so that dropping an unpolled stream
    // still cancels the run.
    let mut guard = CancelGuard {
        writer: projection.writer.clone(),
        run_id: run_id.clone(),
        yielded: 0,
        armed: true,
    };

    let inner = async_stream::stream! {
        let started = Instant::now();

        while let Some(event) = driver.next_event().await {
            persist_step(&projection, &event);
            guard.yielded += 1;
            yield ProjectedEvent {
                run_id: projection.run_id.clone(),
                sequence: guard.yielded,
                elapsed_ms: started.elapsed().as_millis() as u64,
                item: StreamItem::Event(bound_event(event, &projection.stream_limits)),
            };
        }

        let total_steps = driver.steps_invoked();
        let result = finish(driver.take_outcome(), &projection, total_steps).await;
        guard.disarm();

        let done = DoneEvent::new(&result, total_steps, started.elapsed().as_millis() as u64);
        *slot.lock() = Some(result);
        guard.yielded += 1;
        yield ProjectedEvent {
            run_id: projection.run_id.clone(),
            sequence: guard.yielded,
            elapsed_ms: done.total_ms,
            item: StreamItem::Done(done),
        };
    };

    ProjectedStream {
        run_id,
        inner: Box::pin(inner),
        outcome,
    }
}

fn persist_step(projection: &Projection, event: &ObservableEvent) {
    match event {
        ObservableEvent::StepStarted {
            step,
            index,
            details,
        } => {
            projection.writer.try_log_step(StepRecord::started(
                &projection.run_id,
                step,
                *index,
                event.event_type(),
                projection
                    .persist_limits
                    .apply(&json!({ "details": details })),
            ));
        }
        ObservableEvent::StepCompleted {
            index,
            status,
            data,
            duration_ms,
            ..
        } => {
            projection.writer.try_complete_step(StepCompletion {
                run_id: projection.run_id.clone(),
                step_index: *index,
                event_type: event.event_type().to_string(),
                event_data: projection
                    .persist_limits
                    .apply(&json!({ "status": status, "data": data })),
                completed_at: Utc::now(),
                duration_ms: *duration_ms,
            });
        }
        _ => {}
    }
}

fn bound_event(event: ObservableEvent, limits: &Truncation) -> ObservableEvent {
    match event {
        ObservableEvent::StepCompleted {
            step,
            index,
            status,
            data,
            duration_ms,
        } => ObservableEvent::StepCompleted {
            step,
            index,
            status,
            data: limits.apply(&data),
            duration_ms,
        },
        ObservableEvent::Progress { step, name, data } => ObservableEvent::Progress {
            step,
            name,
            data: limits.apply(&data),
        },
        ObservableEvent::Stopped { result } => ObservableEvent::Stopped {
            result: limits.apply(&result),
        },
        other => other,
    }
}

async fn finish(
    result: Option<DriveResult>,
    projection: &Projection,
    total_steps: u32,
) -> RunOutcome {
    let run_id = projection.run_id.clone();
    let (outcome, update) = match result {
        Some(DriveResult::Completed(result)) => (
            RunOutcome::Completed {
                run_id,
                result: result.clone(),
            },
            StatusUpdate::completed(result),
        ),
        Some(DriveResult::Failed(error)) => (
            RunOutcome::Failed {
                run_id,
                error: error.clone(),
            },
            StatusUpdate::failed(error),
        ),
        Some(DriveResult::Suspended(suspension)) => {
            let now = Utc::now();
            let record = SuspensionRecord {
                workflow_id: suspension.workflow_id.clone(),
                run_id: run_id.clone(),
                flow_id: projection.flow_id.clone(),
                session_id: projection.session_id.clone(),
                prompt: suspension.prompt,
                operator: suspension.operator,
                snapshot: suspension.snapshot,
                status: SuspensionStatus::PendingInput,
                created_at: now,
                updated_at: now,
            };
            match projection.store.save_suspension(&record).await {
                Ok(()) => (
                    RunOutcome::Suspended(SuspensionDescriptor::from(&record)),
                    StatusUpdate::new(RunStatus::HitlPending)
                        .with_metadata("workflow_id", json!(record.workflow_id)),
                ),
                // Unanswerable without its record, so the run cannot stay parked.
                Err(e) => {
                    error!(
                        run_id = %run_id,
                        workflow_id = %record.workflow_id,
                        "Failed to save suspension: {}", e
                    );
                    let error = format!("cannot save suspension: {}", e);
                    (
                        RunOutcome::Failed {
                            run_id,
                            error: error.clone(),
                        },
                        StatusUpdate::failed(error),
                    )
                }
            }
        }
        None => {
            let error = "run ended without an outcome".to_string();
            (
                RunOutcome::Failed {
                    run_id,
                    error: error.clone(),
                },
                StatusUpdate::failed(error),
            )
        }
    };

    debug!(
        run_id = %outcome.run_id(),
        status = outcome.status(),
        total_steps,
        "Recording run outcome"
    );
    let update = update.with_metadata("total_steps", json!(total_steps));
    if let Err(e) = projection.writer.update_status(outcome.run_id(), update).await {
        warn!(run_id = %outcome.run_id(), "Failed to queue run status: {}", e);
    }
    // The outcome is on record before `done` reaches the consumer, so a
    // suspension can be answered as soon as it is announced.
    projection.writer.flush().await;
    outcome
}

#[cfg(test)]
#[path = "projector_tests.rs"]
mod tests;
