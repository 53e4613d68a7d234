//! Run driver errors.

use thiserror::Error;

use super::StepError;

#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("Step '{step}' failed: {source}")]
    Step { step: String, source: StepError },

    #[error("Run exceeded its timeout of {0}s")]
    Timeout(u64),

    #[error("Run ended without reaching a terminal event")]
    NoTerminalEvent,

    #[error("No step consumes event '{0}'")]
    Undeliverable(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
