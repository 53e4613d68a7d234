//! HTTP route definitions.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::stream::{stream_flow, stream_respond};

/// Create the router.
///
/// ```text
/// GET    /health
/// GET    /flows
/// POST   /flows/{id}/run                   - run until done or suspended
/// POST   /flows/{id}/run/respond           - answer a suspension
/// POST   /flows/{id}/run/async             - start in the background
/// GET    /flows/{id}/run/{run_id}          - run status (?include_steps=true)
/// GET    /flows/{id}/run/{run_id}/steps    - step records
/// POST   /flows/{id}/run/{run_id}/cancel   - cancel a background run
/// POST   /flows/{id}/stream                - run as server-sent events
/// POST   /flows/{id}/stream/respond        - answer a suspension, stream the rest
/// GET    /flows/{id}/suspension/{wf_id}    - suspension status (?include_snapshot=true)
/// DELETE /flows/{id}/session/{session_id}  - clear session memory
/// ```
pub fn create_router(state: Arc<AppState>) -> Router {
    let flow_routes = Router::new()
        .route("/", get(handlers::list_flows))
        .route("/{id}/run", post(handlers::run_flow))
        .route("/{id}/run/respond", post(handlers::respond))
        .route("/{id}/run/async", post(handlers::run_async))
        .route("/{id}/run/{run_id}", get(handlers::get_run))
        .route("/{id}/run/{run_id}/steps", get(handlers::get_run_steps))
        .route("/{id}/run/{run_id}/cancel", post(handlers::cancel_run))
        .route("/{id}/stream", post(stream_flow))
        .route("/{id}/stream/respond", post(stream_respond))
        .route(
            "/{id}/suspension/{workflow_id}",
            get(handlers::get_suspension),
        )
        .route("/{id}/session/{session_id}", delete(handlers::clear_session));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/flows", flow_routes)
        .route("/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
