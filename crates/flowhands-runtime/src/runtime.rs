//! Flow runtime facade.
//!
//! Owns the flow registry, the store, the persistence writer and the memory
//! provider, and exposes run invocation, resume, polling and cancellation.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flowhands_config::{Config, RuntimeConfig, WriterSettings};
use flowhands_core::context::{ContextSnapshot, Resources};
use flowhands_core::flow::FlowHandle;
use flowhands_core::registry::{FlowInfo, FlowRegistry};
use flowhands_protocols::error::FlowError;
use flowhands_protocols::event::HumanResponseEvent;
use flowhands_protocols::memory::MemoryProvider;
use flowhands_protocols::record::{
    RunRecord, RunStatus, StatusUpdate, StepRecord, SuspensionRecord, SuspensionStatus,
};
use flowhands_protocols::store::{FlowStore, SuspensionStore};
use flowhands_store::{MemoryStore, PersistenceWriter, RetryConfig, WriterConfig, WriterStats};

use crate::memory::InMemoryMemoryProvider;
use crate::outcome::RunOutcome;
use crate::projector::{ProjectedStream, Projection, project};
use crate::truncate::Truncation;

/// The flow runtime.
pub struct FlowRuntime {
    registry: Arc<FlowRegistry>,
    store: Arc<dyn FlowStore>,
    writer: PersistenceWriter,
    memory: Arc<dyn MemoryProvider>,
    settings: RuntimeConfig,
    active: DashMap<String, CancellationToken>,
}

impl FlowRuntime {
    /// Create a runtime. Spawns the persistence writer, so this must be
    /// called from within a tokio runtime.
    pub fn new(
        registry: Arc<FlowRegistry>,
        store: Arc<dyn FlowStore>,
        memory: Arc<dyn MemoryProvider>,
        config: &Config,
    ) -> Self {
        let writer = PersistenceWriter::spawn(Arc::clone(&store), writer_config(&config.writer));
        info!(
            "Flow runtime ready: {} flows, store '{}'",
            registry.len(),
            store.id()
        );
        Self {
            registry,
            store,
            writer,
            memory,
            settings: config.runtime.clone(),
            active: DashMap::new(),
        }
    }

    /// Runtime with volatile storage and default settings.
    pub fn in_memory(registry: Arc<FlowRegistry>) -> Self {
        Self::new(
            registry,
            Arc::new(MemoryStore::new()),
            Arc::new(InMemoryMemoryProvider::new()),
            &Config::default(),
        )
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn FlowStore> {
        &self.store
    }

    pub fn list_flows(&self) -> Vec<FlowInfo> {
        self.registry.list()
    }

    /// Run a flow until it completes, fails or parks.
    pub async fn start(
        &self,
        flow_id: &str,
        input: serde_json::Value,
        session_id: Option<String>,
    ) -> Result<RunOutcome, FlowError> {
        let stream = self.stream(flow_id, input, session_id).await?;
        Ok(self.drain(stream).await)
    }

    /// Start a flow and return its observable stream. The run advances only
    /// while the stream is polled.
    pub async fn stream(
        &self,
        flow_id: &str,
        input: serde_json::Value,
        session_id: Option<String>,
    ) -> Result<ProjectedStream, FlowError> {
        let flow = self.flow(flow_id)?;
        let resources = self.resources(flow_id, session_id.as_deref()).await?;

        let run = RunRecord::new(flow_id, session_id.clone(), input.clone());
        self.store.create_run(&run).await?;
        self.writer
            .update_status(&run.id, StatusUpdate::new(RunStatus::Running))
            .await?;

        info!(run_id = %run.id, flow_id, session_id = ?session_id, "Run started");
        let driver = flow.start(
            &run.id,
            input,
            session_id.clone(),
            resources,
            self.timeout_for(flow.as_ref()),
        );
        Ok(project(driver, self.projection(&run.id, flow_id, session_id)))
    }

    /// Resume a run from a snapshot with the operator's response.
    pub async fn resume(
        &self,
        snapshot: &serde_json::Value,
        response: impl Into<String>,
        operator: impl Into<String>,
        session_id: Option<String>,
    ) -> Result<RunOutcome, FlowError> {
        let stream = self
            .resume_stream(snapshot, response, operator, session_id)
            .await?;
        Ok(self.drain(stream).await)
    }

    /// Resume a run from a snapshot and return its observable stream.
    ///
    /// The run must still be parked on the suspension the snapshot was taken
    /// for; that suspension is consumed here exactly as by
    /// [`FlowRuntime::respond`]. A snapshot whose run is unknown to this
    /// store recreates the run record. The session defaults to the one
    /// recorded in the snapshot; the memory handle for it is re-attached.
    pub async fn resume_stream(
        &self,
        snapshot: &serde_json::Value,
        response: impl Into<String>,
        operator: impl Into<String>,
        session_id: Option<String>,
    ) -> Result<ProjectedStream, FlowError> {
        let header = ContextSnapshot::from_value(snapshot)?;
        let workflow_id = header.workflow_id.clone();
        let response = HumanResponseEvent {
            response: response.into(),
            operator: operator.into(),
        };
        self.resume_parked(header, snapshot, workflow_id.as_deref(), response, session_id)
            .await
    }

    /// Answer a stored suspension.
    ///
    /// When `operator` is given it must match the identity recorded at
    /// suspension time. The record is consumed (marked completed) before the
    /// run resumes, so a descriptor can be answered only once.
    pub async fn respond(
        &self,
        workflow_id: &str,
        response: impl Into<String>,
        operator: Option<&str>,
    ) -> Result<RunOutcome, FlowError> {
        let stream = self.respond_stream(workflow_id, response, operator).await?;
        Ok(self.drain(stream).await)
    }

    /// Answer a stored suspension and return the resumed run's stream.
    pub async fn respond_stream(
        &self,
        workflow_id: &str,
        response: impl Into<String>,
        operator: Option<&str>,
    ) -> Result<ProjectedStream, FlowError> {
        let record = self.suspension(workflow_id).await?;
        if record.status != SuspensionStatus::PendingInput {
            return Err(FlowError::NotSuspended {
                workflow_id: workflow_id.to_string(),
                status: record.status.to_string(),
            });
        }
        let operator = match operator {
            Some(actual) if actual != record.operator => {
                warn!(workflow_id, expected = %record.operator, actual, "Operator mismatch");
                return Err(FlowError::SuspensionMismatch {
                    expected: record.operator.clone(),
                    actual: actual.to_string(),
                });
            }
            _ => record.operator.clone(),
        };

        let header = ContextSnapshot::from_value(&record.snapshot)?;
        let response = HumanResponseEvent {
            response: response.into(),
            operator,
        };
        self.resume_parked(
            header,
            &record.snapshot,
            Some(workflow_id),
            response,
            record.session_id.clone(),
        )
        .await
    }

    async fn resume_parked(
        &self,
        header: ContextSnapshot,
        snapshot: &serde_json::Value,
        workflow_id: Option<&str>,
        response: HumanResponseEvent,
        session_id: Option<String>,
    ) -> Result<ProjectedStream, FlowError> {
        let flow = self.flow(&header.flow)?;
        let session_id = session_id.or(header.session_id.clone());
        let claimed = self.claim(&header, workflow_id, session_id.clone()).await?;

        let resumed = async {
            let resources = self.resources(&header.flow, session_id.as_deref()).await?;
            let driver = flow.resume(
                snapshot,
                response,
                resources,
                self.timeout_for(flow.as_ref()),
            )?;
            self.writer
                .update_status(&header.run_id, StatusUpdate::new(RunStatus::Running))
                .await?;
            Ok::<_, FlowError>(driver)
        }
        .await;

        let driver = match resumed {
            Ok(driver) => driver,
            Err(e) => {
                if let Some(workflow_id) = claimed.as_deref() {
                    warn!(workflow_id, "Cannot resume suspension: {}", e);
                    if let Err(mark) = self
                        .store
                        .update_suspension_status(workflow_id, SuspensionStatus::Failed)
                        .await
                    {
                        warn!(workflow_id, "Cannot mark suspension failed: {}", mark);
                    }
                }
                return Err(e);
            }
        };

        info!(
            run_id = %header.run_id,
            flow_id = %header.flow,
            workflow_id = ?claimed,
            "Run resumed"
        );
        Ok(project(
            driver,
            self.projection(&header.run_id, &header.flow, session_id),
        ))
    }

    /// Check that the run is parked on `workflow_id` and consume that
    /// suspension. Returns the consumed id, or `None` when the run was
    /// unknown here and has been recreated from the snapshot.
    async fn claim(
        &self,
        header: &ContextSnapshot,
        workflow_id: Option<&str>,
        session_id: Option<String>,
    ) -> Result<Option<String>, FlowError> {
        let Some(run) = self.store.get_run(&header.run_id).await? else {
            let claimed = match workflow_id {
                Some(id) if self.store.get_suspension(id).await?.is_some() => {
                    self.claim_record(id).await?;
                    Some(id.to_string())
                }
                _ => None,
            };
            debug!(run_id = %header.run_id, "Recreating run record for foreign snapshot");
            let run = RunRecord::with_id(
                &header.run_id,
                &header.flow,
                session_id,
                serde_json::Value::Null,
            );
            self.store.create_run(&run).await?;
            return Ok(claimed);
        };

        if run.status != RunStatus::HitlPending {
            return Err(FlowError::NotSuspended {
                workflow_id: workflow_id.unwrap_or(run.id.as_str()).to_string(),
                status: run.status.to_string(),
            });
        }
        let Some(workflow_id) = workflow_id else {
            return Err(FlowError::InvalidSnapshot(
                "snapshot does not name the suspension it was taken for".to_string(),
            ));
        };
        let parked_on = run
            .metadata
            .get("workflow_id")
            .and_then(serde_json::Value::as_str);
        if parked_on != Some(workflow_id) {
            warn!(
                run_id = %run.id,
                workflow_id,
                parked_on = ?parked_on,
                "Snapshot superseded by a later suspension"
            );
            return Err(FlowError::NotSuspended {
                workflow_id: workflow_id.to_string(),
                status: "superseded".to_string(),
            });
        }

        self.claim_record(workflow_id).await?;
        Ok(Some(workflow_id.to_string()))
    }

    async fn claim_record(&self, workflow_id: &str) -> Result<(), FlowError> {
        if self.store.claim_suspension(workflow_id).await? {
            return Ok(());
        }
        match self.store.get_suspension(workflow_id).await? {
            Some(record) => Err(FlowError::NotSuspended {
                workflow_id: workflow_id.to_string(),
                status: record.status.to_string(),
            }),
            None => Err(FlowError::SuspensionNotFound(workflow_id.to_string())),
        }
    }

    /// Start a run in the background and return its id. The run can be
    /// stopped with [`FlowRuntime::cancel`].
    pub async fn start_async(
        self: &Arc<Self>,
        flow_id: &str,
        input: serde_json::Value,
        session_id: Option<String>,
    ) -> Result<String, FlowError> {
        let mut stream = self.stream(flow_id, input, session_id).await?;
        let run_id = stream.run_id().to_string();
        let token = CancellationToken::new();
        self.active.insert(run_id.clone(), token.clone());

        let runtime = Arc::clone(self);
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!(run_id = %task_run_id, "Background run cancelled");
                        break;
                    }
                    item = stream.next() => {
                        if item.is_none() {
                            break;
                        }
                    }
                }
            }
            drop(stream);
            runtime.active.remove(&task_run_id);
        });

        Ok(run_id)
    }

    /// Cancel a background run. Returns `false` if it is not running.
    pub fn cancel(&self, run_id: &str) -> bool {
        match self.active.remove(run_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of background runs still in progress.
    pub fn active_runs(&self) -> usize {
        self.active.len()
    }

    pub async fn get_run_status(&self, run_id: &str) -> Result<RunRecord, FlowError> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| FlowError::RunNotFound(run_id.to_string()))
    }

    pub async fn get_run_steps(&self, run_id: &str) -> Result<Vec<StepRecord>, FlowError> {
        self.get_run_status(run_id).await?;
        Ok(self.store.list_steps(run_id).await?)
    }

    pub async fn suspension(&self, workflow_id: &str) -> Result<SuspensionRecord, FlowError> {
        self.store
            .get_suspension(workflow_id)
            .await?
            .ok_or_else(|| FlowError::SuspensionNotFound(workflow_id.to_string()))
    }

    /// Reset the memory of a session within a flow.
    pub async fn clear_session(&self, flow_id: &str, session_id: &str) -> Result<bool, FlowError> {
        self.flow(flow_id)?;
        let cleared = self.memory.reset(session_id, flow_id).await?;
        info!(flow_id, session_id, cleared, "Session cleared");
        Ok(cleared)
    }

    /// Wait until every queued persistence write has been handled.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn writer_stats(&self) -> WriterStats {
        self.writer.stats()
    }

    fn flow(&self, flow_id: &str) -> Result<Arc<dyn FlowHandle>, FlowError> {
        self.registry
            .get(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))
    }

    fn timeout_for(&self, flow: &dyn FlowHandle) -> Duration {
        flow.timeout()
            .unwrap_or_else(|| Duration::from_secs(self.settings.run_timeout_secs))
    }

    async fn resources(
        &self,
        flow_id: &str,
        session_id: Option<&str>,
    ) -> Result<Resources, FlowError> {
        let mut resources = Resources::new();
        if let Some(session_id) = session_id {
            resources = resources.with_memory(self.memory.get_handle(session_id, flow_id).await?);
        }
        Ok(resources)
    }

    fn projection(&self, run_id: &str, flow_id: &str, session_id: Option<String>) -> Projection {
        Projection {
            run_id: run_id.to_string(),
            flow_id: flow_id.to_string(),
            session_id,
            store: Arc::clone(&self.store),
            writer: self.writer.clone(),
            persist_limits: Truncation::new(
                self.settings.event_max_chars,
                self.settings.event_max_items,
            ),
            stream_limits: Truncation::new(
                self.settings.stream_max_chars,
                self.settings.stream_max_items,
            ),
        }
    }

    async fn drain(&self, stream: ProjectedStream) -> RunOutcome {
        let run_id = stream.run_id().to_string();
        let outcome = stream.drain().await.unwrap_or_else(|| RunOutcome::Failed {
            run_id,
            error: "run ended without an outcome".to_string(),
        });
        self.writer.flush().await;
        outcome
    }
}

fn writer_config(settings: &WriterSettings) -> WriterConfig {
    WriterConfig {
        queue_capacity: settings.queue_capacity,
        retry: RetryConfig {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            ..RetryConfig::default()
        },
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
