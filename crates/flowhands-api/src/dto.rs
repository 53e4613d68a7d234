//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flowhands_core::registry::FlowInfo;
use flowhands_protocols::record::{RunRecord, StepRecord, SuspensionRecord, SuspensionStatus};
use flowhands_store::WriterStats;

/// Body of a run or stream request.
#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Answer to a stored suspension.
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub workflow_id: String,
    pub response: String,
    /// Must match the operator recorded at suspension time when given.
    #[serde(default)]
    pub operator: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AsyncRunResponse {
    pub run_id: String,
    pub flow_id: String,
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunStatusQuery {
    #[serde(default)]
    pub include_steps: bool,
}

#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    #[serde(flatten)]
    pub run: RunRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepRecord>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuspensionQuery {
    #[serde(default)]
    pub include_snapshot: bool,
}

/// A stored suspension. The snapshot is only sent on request.
#[derive(Debug, Serialize)]
pub struct SuspensionResponse {
    pub workflow_id: String,
    pub run_id: String,
    pub flow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub prompt: String,
    pub operator: String,
    pub status: SuspensionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,
}

impl SuspensionResponse {
    pub fn new(record: SuspensionRecord, include_snapshot: bool) -> Self {
        Self {
            workflow_id: record.workflow_id,
            run_id: record.run_id,
            flow_id: record.flow_id,
            session_id: record.session_id,
            prompt: record.prompt,
            operator: record.operator,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            snapshot: include_snapshot.then_some(record.snapshot),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StepListResponse {
    pub run_id: String,
    pub count: usize,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Serialize)]
pub struct FlowListResponse {
    pub count: usize,
    pub flows: Vec<FlowInfo>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub run_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionClearedResponse {
    pub flow_id: String,
    pub session_id: String,
    pub cleared: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub flows: usize,
    pub active_runs: usize,
    pub store: String,
    pub writer: WriterStats,
}
