//! Step errors.

use thiserror::Error;

use super::{MemoryError, WorkerError};

/// Failure raised by a step's own logic.
///
/// The scheduler never retries a step; a `StepError` fails the run with its
/// message retained.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("{0}")]
    Failed(String),

    #[error("Step '{step}' emitted undeclared event '{event}'")]
    UndeclaredEvent { step: String, event: String },

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Context error: {0}")]
    Context(String),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        Self::Context(e.to_string())
    }
}
