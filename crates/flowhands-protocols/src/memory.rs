//! Conversation memory capability.
//!
//! Memory handles are resources, not data: they never enter a context
//! snapshot and must be re-attached after a run is restored.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// One remembered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Live handle on one session's memory within a scope.
#[async_trait]
pub trait MemoryHandle: Send + Sync {
    fn session_id(&self) -> &str;

    async fn put(&self, message: MemoryMessage) -> Result<(), MemoryError>;

    async fn history(&self) -> Result<Vec<MemoryMessage>, MemoryError>;
}

#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Get (or create) the handle for a session within a scope.
    async fn get_handle(
        &self,
        session_id: &str,
        scope: &str,
    ) -> Result<Arc<dyn MemoryHandle>, MemoryError>;

    /// Drop everything remembered for a session within a scope.
    ///
    /// Returns `true` if anything was removed.
    async fn reset(&self, session_id: &str, scope: &str) -> Result<bool, MemoryError>;
}
