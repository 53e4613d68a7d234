//! In-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use flowhands_protocols::error::PersistenceError;
use flowhands_protocols::record::{
    RunRecord, StatusUpdate, StepCompletion, StepRecord, SuspensionRecord, SuspensionStatus,
};
use flowhands_protocols::store::{RunStore, SuspensionStore};

/// Volatile store. Same semantics as the durable store, no restart survival.
pub struct MemoryStore {
    runs: RwLock<HashMap<String, RunRecord>>,
    steps: RwLock<HashMap<String, Vec<StepRecord>>>,
    suspensions: RwLock<HashMap<String, SuspensionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            steps: RwLock::new(HashMap::new()),
            suspensions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    fn id(&self) -> &str {
        "memory"
    }

    async fn create_run(&self, run: &RunRecord) -> Result<(), PersistenceError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(PersistenceError::Duplicate(run.id.clone()));
        }
        runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        update: &StatusUpdate,
    ) -> Result<(), PersistenceError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| PersistenceError::NotFound(run_id.to_string()))?;
        run.apply(update)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, PersistenceError> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).cloned())
    }

    async fn append_step(&self, step: &StepRecord) -> Result<(), PersistenceError> {
        let mut steps = self.steps.write().await;
        let records = steps.entry(step.run_id.clone()).or_default();
        match records.binary_search_by_key(&step.step_index, |s| s.step_index) {
            Ok(_) => Err(PersistenceError::Duplicate(format!(
                "{}#{}",
                step.run_id, step.step_index
            ))),
            Err(position) => {
                records.insert(position, step.clone());
                Ok(())
            }
        }
    }

    async fn complete_step(&self, completion: &StepCompletion) -> Result<(), PersistenceError> {
        let mut steps = self.steps.write().await;
        let record = steps
            .get_mut(&completion.run_id)
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|s| s.step_index == completion.step_index)
            })
            .ok_or_else(|| {
                PersistenceError::NotFound(format!(
                    "{}#{}",
                    completion.run_id, completion.step_index
                ))
            })?;
        record.complete(completion);
        Ok(())
    }

    async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>, PersistenceError> {
        let steps = self.steps.read().await;
        Ok(steps.get(run_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SuspensionStore for MemoryStore {
    async fn save_suspension(&self, record: &SuspensionRecord) -> Result<(), PersistenceError> {
        let mut suspensions = self.suspensions.write().await;
        suspensions.insert(record.workflow_id.clone(), record.clone());
        Ok(())
    }

    async fn get_suspension(
        &self,
        workflow_id: &str,
    ) -> Result<Option<SuspensionRecord>, PersistenceError> {
        let suspensions = self.suspensions.read().await;
        Ok(suspensions.get(workflow_id).cloned())
    }

    async fn update_suspension_status(
        &self,
        workflow_id: &str,
        status: SuspensionStatus,
    ) -> Result<(), PersistenceError> {
        let mut suspensions = self.suspensions.write().await;
        let record = suspensions
            .get_mut(workflow_id)
            .ok_or_else(|| PersistenceError::NotFound(workflow_id.to_string()))?;
        record.status = status;
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn claim_suspension(&self, workflow_id: &str) -> Result<bool, PersistenceError> {
        let mut suspensions = self.suspensions.write().await;
        match suspensions.get_mut(workflow_id) {
            Some(record) if record.status == SuspensionStatus::PendingInput => {
                record.status = SuspensionStatus::Completed;
                record.updated_at = chrono::Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_suspension(&self, workflow_id: &str) -> Result<bool, PersistenceError> {
        let mut suspensions = self.suspensions.write().await;
        Ok(suspensions.remove(workflow_id).is_some())
    }
}
