//! Run outcomes and projected stream items.

use serde::{Deserialize, Serialize};

use flowhands_protocols::observable::ObservableEvent;
use flowhands_protocols::record::SuspensionRecord;

/// A parked run as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspensionDescriptor {
    pub workflow_id: String,
    pub run_id: String,
    pub flow_id: String,
    pub prompt: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub snapshot: serde_json::Value,
}

impl From<&SuspensionRecord> for SuspensionDescriptor {
    fn from(record: &SuspensionRecord) -> Self {
        Self {
            workflow_id: record.workflow_id.clone(),
            run_id: record.run_id.clone(),
            flow_id: record.flow_id.clone(),
            prompt: record.prompt.clone(),
            operator: record.operator.clone(),
            session_id: record.session_id.clone(),
            snapshot: record.snapshot.clone(),
        }
    }
}

/// Result of driving a run until it stops or parks.
///
/// Step failures are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed {
        run_id: String,
        result: serde_json::Value,
    },
    Suspended(SuspensionDescriptor),
    Failed {
        run_id: String,
        error: String,
    },
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        match self {
            RunOutcome::Completed { run_id, .. } | RunOutcome::Failed { run_id, .. } => run_id,
            RunOutcome::Suspended(descriptor) => &descriptor.run_id,
        }
    }

    /// Status name as used in run records and the final stream event.
    pub fn status(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::Suspended(_) => "hitl_pending",
            RunOutcome::Failed { .. } => "failed",
        }
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            RunOutcome::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn suspension(&self) -> Option<&SuspensionDescriptor> {
        match self {
            RunOutcome::Suspended(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}

/// Final stream item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneEvent {
    pub total_steps: u32,
    pub total_ms: u64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DoneEvent {
    pub fn new(outcome: &RunOutcome, total_steps: u32, total_ms: u64) -> Self {
        let mut done = Self {
            total_steps,
            total_ms,
            status: outcome.status().to_string(),
            workflow_id: None,
            prompt: None,
            result: None,
            error: None,
        };
        match outcome {
            RunOutcome::Completed { result, .. } => done.result = Some(result.clone()),
            RunOutcome::Suspended(descriptor) => {
                done.workflow_id = Some(descriptor.workflow_id.clone());
                done.prompt = Some(descriptor.prompt.clone());
            }
            RunOutcome::Failed { error, .. } => done.error = Some(error.clone()),
        }
        done
    }
}

/// One stream item: an observable event or the final `done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamItem {
    Event(ObservableEvent),
    Done(DoneEvent),
}

impl StreamItem {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            StreamItem::Event(event) => event.event_type(),
            StreamItem::Done(_) => "done",
        }
    }
}

/// Stream item with run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedEvent {
    pub run_id: String,
    /// Position in the stream, starting at 1.
    pub sequence: u32,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub item: StreamItem,
}

impl ProjectedEvent {
    pub fn is_done(&self) -> bool {
        matches!(self.item, StreamItem::Done(_))
    }
}
