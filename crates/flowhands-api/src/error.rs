//! API error type and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use flowhands_protocols::error::FlowError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Flow(e) => match e {
                FlowError::UnknownFlow(_)
                | FlowError::SuspensionNotFound(_)
                | FlowError::RunNotFound(_) => StatusCode::NOT_FOUND,
                FlowError::SuspensionMismatch { .. } | FlowError::NotSuspended { .. } => {
                    StatusCode::CONFLICT
                }
                FlowError::InvalidSnapshot(_) | FlowError::Definition(_) => {
                    StatusCode::BAD_REQUEST
                }
                FlowError::Persistence(_) | FlowError::Memory(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
