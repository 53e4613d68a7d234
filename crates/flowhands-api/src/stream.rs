//! Server-sent event streaming of runs.
//!
//! Each projected event becomes one SSE event named after its type; the last
//! one is named `done`. A client that disconnects drops the stream, which
//! cancels the run.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures::{Stream, StreamExt};
use tracing::{info, warn};

use flowhands_runtime::ProjectedEvent;

use crate::dto::{RespondRequest, RunRequest};
use crate::error::ApiError;
use crate::handlers::{suspension_of, validate_input};
use crate::state::AppState;

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

pub(crate) fn to_sse(event: &ProjectedEvent) -> Event {
    Event::default()
        .event(event.item.name())
        .json_data(event)
        .unwrap_or_else(|e| {
            warn!(run_id = %event.run_id, "Cannot encode stream event: {}", e);
            Event::default().event("error").data(e.to_string())
        })
}

/// POST /flows/{id}/stream
pub async fn stream_flow(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
    Json(request): Json<RunRequest>,
) -> Result<Sse<KeepAliveStream<SseStream>>, ApiError> {
    let input = validate_input(request.input)?;
    let projected = state
        .runtime
        .stream(&flow_id, input, request.session_id)
        .await?;
    info!(flow_id = %flow_id, run_id = %projected.run_id(), "Streaming run");

    let stream: SseStream = Box::pin(projected.map(|event| Ok(to_sse(&event))));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// POST /flows/{id}/stream/respond
///
/// Answers a suspension and streams the resumed run. Rejections (unknown
/// descriptor, operator mismatch, already answered) are plain JSON errors
/// sent before any event.
pub async fn stream_respond(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
    Json(request): Json<RespondRequest>,
) -> Result<Sse<KeepAliveStream<SseStream>>, ApiError> {
    suspension_of(&state, &flow_id, &request.workflow_id).await?;
    let projected = state
        .runtime
        .respond_stream(
            &request.workflow_id,
            request.response,
            request.operator.as_deref(),
        )
        .await?;
    info!(
        flow_id = %flow_id,
        workflow_id = %request.workflow_id,
        run_id = %projected.run_id(),
        "Streaming resumed run"
    );

    let stream: SseStream = Box::pin(projected.map(|event| Ok(to_sse(&event))));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
