//! # FlowHands API
//!
//! HTTP surface over a [`flowhands_runtime::FlowRuntime`]: synchronous and
//! background runs, suspension responses, run polling, cancellation and
//! server-sent event streaming.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod stream;

pub use error::ApiError;
pub use routes::create_router;
pub use server::{ApiServer, ServerConfig};
pub use state::AppState;
