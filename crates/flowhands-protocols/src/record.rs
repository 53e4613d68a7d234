//! Persisted run, step and suspension records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// Free-form metadata attached to a run.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    HitlPending,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::HitlPending => "hitl_pending",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states are final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Only completed and failed runs carry a completion timestamp.
    pub fn sets_completed_at(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "hitl_pending" => Ok(RunStatus::HitlPending),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(PersistenceError::Serialization(format!(
                "unknown run status: {}",
                other
            ))),
        }
    }
}

/// One end-to-end invocation of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub flow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: RunStatus,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RunRecord {
    /// Create a pending run with a fresh id.
    pub fn new(
        flow_id: impl Into<String>,
        session_id: Option<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), flow_id, session_id, input)
    }

    pub fn with_id(
        id: impl Into<String>,
        flow_id: impl Into<String>,
        session_id: Option<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            flow_id: flow_id.into(),
            session_id,
            status: RunStatus::Pending,
            input,
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            metadata: Metadata::new(),
        }
    }

    /// Apply a status transition.
    ///
    /// Shared by every store so the in-memory and durable variants agree.
    pub fn apply(&mut self, update: &StatusUpdate) -> Result<(), PersistenceError> {
        if self.status.is_terminal() {
            return Err(PersistenceError::InvalidTransition {
                run_id: self.id.clone(),
                from: self.status.to_string(),
                to: update.status.to_string(),
            });
        }

        self.status = update.status;
        match update.status {
            RunStatus::Completed => self.result = update.result.clone(),
            RunStatus::Failed => self.error = update.error.clone(),
            _ => {}
        }
        self.completed_at = if update.status.sets_completed_at() {
            Some(Utc::now())
        } else {
            None
        };
        for (key, value) in &update.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// A requested status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl StatusUpdate {
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            result: None,
            error: None,
            metadata: Metadata::new(),
        }
    }

    pub fn completed(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            ..Self::new(RunStatus::Completed)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(RunStatus::Failed)
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Status of a step execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Started => "started",
            StepStatus::Completed => "completed",
        }
    }
}

impl FromStr for StepStatus {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(StepStatus::Started),
            "completed" => Ok(StepStatus::Completed),
            other => Err(PersistenceError::Serialization(format!(
                "unknown step status: {}",
                other
            ))),
        }
    }
}

/// One step invocation within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    pub run_id: String,
    pub step_name: String,
    pub step_index: u32,
    pub status: StepStatus,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl StepRecord {
    pub fn started(
        run_id: impl Into<String>,
        step_name: impl Into<String>,
        step_index: u32,
        event_type: impl Into<String>,
        event_data: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            step_name: step_name.into(),
            step_index,
            status: StepStatus::Started,
            event_type: event_type.into(),
            event_data,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    pub fn complete(&mut self, completion: &StepCompletion) {
        self.status = StepStatus::Completed;
        self.event_type = completion.event_type.clone();
        self.event_data = completion.event_data.clone();
        self.completed_at = Some(completion.completed_at);
        self.duration_ms = Some(completion.duration_ms);
    }
}

/// Completion of a previously started step record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCompletion {
    pub run_id: String,
    pub step_index: u32,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Status of a stored suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionStatus {
    PendingInput,
    Completed,
    Failed,
    Expired,
}

impl SuspensionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspensionStatus::PendingInput => "pending_input",
            SuspensionStatus::Completed => "completed",
            SuspensionStatus::Failed => "failed",
            SuspensionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SuspensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuspensionStatus {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_input" => Ok(SuspensionStatus::PendingInput),
            "completed" => Ok(SuspensionStatus::Completed),
            "failed" => Ok(SuspensionStatus::Failed),
            "expired" => Ok(SuspensionStatus::Expired),
            other => Err(PersistenceError::Serialization(format!(
                "unknown suspension status: {}",
                other
            ))),
        }
    }
}

/// A parked run awaiting operator input, keyed by workflow id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspensionRecord {
    pub workflow_id: String,
    pub run_id: String,
    pub flow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub prompt: String,
    pub operator: String,
    pub snapshot: serde_json::Value,
    pub status: SuspensionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_round_trip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::HitlPending,
            RunStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("paused".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_apply_completed_sets_result_and_timestamp() {
        let mut run = RunRecord::new("echo_flow", None, serde_json::json!({}));
        run.apply(&StatusUpdate::new(RunStatus::Running)).unwrap();
        assert!(run.completed_at.is_none());

        run.apply(&StatusUpdate::completed(serde_json::json!("Hello")).with_metadata(
            "total_steps",
            serde_json::json!(2),
        ))
        .unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.result, Some(serde_json::json!("Hello")));
        assert!(run.completed_at.is_some());
        assert_eq!(run.metadata["total_steps"], 2);
    }

    #[test]
    fn test_apply_cancelled_leaves_completed_at_empty() {
        let mut run = RunRecord::new("echo_flow", None, serde_json::json!({}));
        run.apply(&StatusUpdate::new(RunStatus::Cancelled)).unwrap();
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut run = RunRecord::new("echo_flow", None, serde_json::json!({}));
        run.apply(&StatusUpdate::failed("boom")).unwrap();
        assert_eq!(run.error.as_deref(), Some("boom"));

        let err = run.apply(&StatusUpdate::new(RunStatus::Running)).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidTransition { .. }));
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn test_hitl_pending_can_resume() {
        let mut run = RunRecord::new("confirm_flow", None, serde_json::json!({}));
        run.apply(&StatusUpdate::new(RunStatus::HitlPending)).unwrap();
        run.apply(&StatusUpdate::new(RunStatus::Running)).unwrap();
        assert_eq!(run.status, RunStatus::Running);
    }

    #[test]
    fn test_step_record_complete() {
        let mut step = StepRecord::started("run-1", "greet", 1, "step_started", serde_json::json!({}));
        let completion = StepCompletion {
            run_id: "run-1".to_string(),
            step_index: 1,
            event_type: "step_completed".to_string(),
            event_data: serde_json::json!({"emitted": ["stop"]}),
            completed_at: Utc::now(),
            duration_ms: 12,
        };
        step.complete(&completion);
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.duration_ms, Some(12));
        assert_eq!(step.event_type, "step_completed");
    }
}
