//! Conversation memory errors.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Memory scope not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}
