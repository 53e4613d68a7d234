//! Persistence interfaces.
//!
//! A durable store and the volatile in-memory fallback implement the same
//! traits and must behave identically.

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::record::{
    RunRecord, StatusUpdate, StepCompletion, StepRecord, SuspensionRecord, SuspensionStatus,
};

/// Run and step execution records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Returns the backend ID.
    fn id(&self) -> &str;

    /// Insert a new run.
    async fn create_run(&self, run: &RunRecord) -> Result<(), PersistenceError>;

    /// Transition a run. Completed and failed transitions set `completed_at`.
    async fn update_run_status(
        &self,
        run_id: &str,
        update: &StatusUpdate,
    ) -> Result<(), PersistenceError>;

    /// Get a run by ID.
    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, PersistenceError>;

    /// Append a started step record.
    async fn append_step(&self, step: &StepRecord) -> Result<(), PersistenceError>;

    /// Fill in the completion of a started step record.
    async fn complete_step(&self, completion: &StepCompletion) -> Result<(), PersistenceError>;

    /// List the step records of a run ordered by step index.
    async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>, PersistenceError>;
}

/// Suspension records keyed by workflow id.
#[async_trait]
pub trait SuspensionStore: Send + Sync {
    async fn save_suspension(&self, record: &SuspensionRecord) -> Result<(), PersistenceError>;

    async fn get_suspension(
        &self,
        workflow_id: &str,
    ) -> Result<Option<SuspensionRecord>, PersistenceError>;

    async fn update_suspension_status(
        &self,
        workflow_id: &str,
        status: SuspensionStatus,
    ) -> Result<(), PersistenceError>;

    /// Atomically move a `pending_input` record to `completed`. Returns
    /// `false` if there is no record or it was already answered, so at
    /// most one caller ever wins a given suspension.
    async fn claim_suspension(&self, workflow_id: &str) -> Result<bool, PersistenceError>;

    /// Returns `true` if a record was removed.
    async fn delete_suspension(&self, workflow_id: &str) -> Result<bool, PersistenceError>;
}

/// A store holding both runs and suspensions.
pub trait FlowStore: RunStore + SuspensionStore {}

impl<T: RunStore + SuspensionStore> FlowStore for T {}
