//! Step worker errors.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("Worker unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid worker output: {0}")]
    InvalidOutput(String),

    #[error("Worker backend error: {0}")]
    Backend(String),
}
