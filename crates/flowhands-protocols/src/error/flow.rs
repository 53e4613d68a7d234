//! Caller-facing errors of the flow runtime.

use thiserror::Error;

use super::{DefinitionError, PersistenceError, RunError};

/// Errors returned synchronously by run invocation.
///
/// Ordinary step failures are not errors at this level; they come back as a
/// failed run outcome.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    #[error("Invalid flow definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Suspension not found: {0}")]
    SuspensionNotFound(String),

    #[error("Workflow {workflow_id} is not awaiting input (status: {status})")]
    NotSuspended { workflow_id: String, status: String },

    #[error("Operator mismatch: expected '{expected}', got '{actual}'")]
    SuspensionMismatch { expected: String, actual: String },

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Memory error: {0}")]
    Memory(#[from] super::MemoryError),
}

impl From<RunError> for FlowError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::InvalidSnapshot(msg) => Self::InvalidSnapshot(msg),
            other => Self::InvalidSnapshot(format!("cannot resume: {}", other)),
        }
    }
}
