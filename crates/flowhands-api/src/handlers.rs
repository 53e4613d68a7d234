//! Flow API handlers.
//!
//! Run, resume, poll and cancel flows through the shared [`FlowRuntime`].
//!
//! [`FlowRuntime`]: flowhands_runtime::FlowRuntime

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use tracing::info;

use flowhands_protocols::error::FlowError;
use flowhands_protocols::record::{RunRecord, SuspensionRecord};
use flowhands_runtime::RunOutcome;

use crate::dto::{
    AsyncRunResponse, CancelResponse, FlowListResponse, HealthResponse, RespondRequest,
    RunRequest, RunStatusQuery, RunStatusResponse, SessionClearedResponse, StepListResponse,
    SuspensionQuery, SuspensionResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Flow input must be a JSON object. A missing input is an empty one.
pub(crate) fn validate_input(input: serde_json::Value) -> ApiResult<serde_json::Value> {
    match input {
        serde_json::Value::Null => Ok(serde_json::json!({})),
        serde_json::Value::Object(_) => Ok(input),
        other => Err(ApiError::BadRequest(format!(
            "input must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Look up a run and make sure it belongs to `flow_id`.
async fn run_of(state: &AppState, flow_id: &str, run_id: &str) -> ApiResult<RunRecord> {
    let run = state.runtime.get_run_status(run_id).await?;
    if run.flow_id != flow_id {
        return Err(FlowError::RunNotFound(run_id.to_string()).into());
    }
    Ok(run)
}

/// Look up a suspension and make sure it belongs to `flow_id`.
pub(crate) async fn suspension_of(
    state: &AppState,
    flow_id: &str,
    workflow_id: &str,
) -> ApiResult<SuspensionRecord> {
    if !state.runtime.registry().contains(flow_id) {
        return Err(FlowError::UnknownFlow(flow_id.to_string()).into());
    }
    let suspension = state.runtime.suspension(workflow_id).await?;
    if suspension.flow_id != flow_id {
        return Err(FlowError::SuspensionNotFound(workflow_id.to_string()).into());
    }
    Ok(suspension)
}

/// GET /flows
pub async fn list_flows(State(state): State<Arc<AppState>>) -> Json<FlowListResponse> {
    let mut flows = state.runtime.list_flows();
    flows.sort_by(|a, b| a.id.cmp(&b.id));
    Json(FlowListResponse {
        count: flows.len(),
        flows,
    })
}

/// POST /flows/{id}/run
pub async fn run_flow(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
    Json(request): Json<RunRequest>,
) -> ApiResult<Json<RunOutcome>> {
    let input = validate_input(request.input)?;
    info!(flow_id = %flow_id, session_id = ?request.session_id, "Run requested");
    let outcome = state
        .runtime
        .start(&flow_id, input, request.session_id)
        .await?;
    Ok(Json(outcome))
}

/// POST /flows/{id}/run/respond
pub async fn respond(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
    Json(request): Json<RespondRequest>,
) -> ApiResult<Json<RunOutcome>> {
    suspension_of(&state, &flow_id, &request.workflow_id).await?;
    info!(flow_id = %flow_id, workflow_id = %request.workflow_id, "Response received");
    let outcome = state
        .runtime
        .respond(
            &request.workflow_id,
            request.response,
            request.operator.as_deref(),
        )
        .await?;
    Ok(Json(outcome))
}

/// GET /flows/{id}/suspension/{workflow_id}?include_snapshot=true
pub async fn get_suspension(
    State(state): State<Arc<AppState>>,
    Path((flow_id, workflow_id)): Path<(String, String)>,
    Query(query): Query<SuspensionQuery>,
) -> ApiResult<Json<SuspensionResponse>> {
    let suspension = suspension_of(&state, &flow_id, &workflow_id).await?;
    Ok(Json(SuspensionResponse::new(
        suspension,
        query.include_snapshot,
    )))
}

/// POST /flows/{id}/run/async
pub async fn run_async(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
    Json(request): Json<RunRequest>,
) -> ApiResult<(StatusCode, Json<AsyncRunResponse>)> {
    let input = validate_input(request.input)?;
    let run_id = state
        .runtime
        .start_async(&flow_id, input, request.session_id)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AsyncRunResponse {
            run_id,
            flow_id,
            status: "running".to_string(),
        }),
    ))
}

/// GET /flows/{id}/run/{run_id}?include_steps=true
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path((flow_id, run_id)): Path<(String, String)>,
    Query(query): Query<RunStatusQuery>,
) -> ApiResult<Json<RunStatusResponse>> {
    let run = run_of(&state, &flow_id, &run_id).await?;
    let steps = if query.include_steps {
        Some(state.runtime.get_run_steps(&run_id).await?)
    } else {
        None
    };
    Ok(Json(RunStatusResponse { run, steps }))
}

/// GET /flows/{id}/run/{run_id}/steps
pub async fn get_run_steps(
    State(state): State<Arc<AppState>>,
    Path((flow_id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<StepListResponse>> {
    run_of(&state, &flow_id, &run_id).await?;
    let steps = state.runtime.get_run_steps(&run_id).await?;
    Ok(Json(StepListResponse {
        run_id,
        count: steps.len(),
        steps,
    }))
}

/// POST /flows/{id}/run/{run_id}/cancel
///
/// Only background runs can be cancelled here; streamed runs are cancelled by
/// disconnecting.
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path((flow_id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<CancelResponse>> {
    run_of(&state, &flow_id, &run_id).await?;
    let cancelled = state.runtime.cancel(&run_id);
    info!(flow_id = %flow_id, run_id = %run_id, cancelled, "Cancel requested");
    Ok(Json(CancelResponse { run_id, cancelled }))
}

/// DELETE /flows/{id}/session/{session_id}
pub async fn clear_session(
    State(state): State<Arc<AppState>>,
    Path((flow_id, session_id)): Path<(String, String)>,
) -> ApiResult<Json<SessionClearedResponse>> {
    let cleared = state.runtime.clear_session(&flow_id, &session_id).await?;
    Ok(Json(SessionClearedResponse {
        flow_id,
        session_id,
        cleared,
    }))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime().as_secs(),
        flows: state.runtime.registry().len(),
        active_runs: state.runtime.active_runs(),
        store: state.runtime.store().id().to_string(),
        writer: state.runtime.writer_stats(),
    })
}
