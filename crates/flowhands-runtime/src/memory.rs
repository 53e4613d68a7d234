//! In-process session memory.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use flowhands_protocols::error::MemoryError;
use flowhands_protocols::memory::{MemoryHandle, MemoryMessage, MemoryProvider};

/// Memory of one session within one scope.
pub struct SessionMemory {
    session_id: String,
    messages: RwLock<Vec<MemoryMessage>>,
}

impl SessionMemory {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            messages: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[async_trait]
impl MemoryHandle for SessionMemory {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn put(&self, message: MemoryMessage) -> Result<(), MemoryError> {
        self.messages.write().push(message);
        Ok(())
    }

    async fn history(&self) -> Result<Vec<MemoryMessage>, MemoryError> {
        Ok(self.messages.read().clone())
    }
}

/// Memory provider keeping every session in process.
///
/// Handles are keyed by `(scope, session_id)`; the runtime uses the flow id
/// as scope, so two flows never share a session's memory.
#[derive(Default)]
pub struct InMemoryMemoryProvider {
    sessions: DashMap<(String, String), Arc<SessionMemory>>,
}

impl InMemoryMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live session handles across all scopes.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl MemoryProvider for InMemoryMemoryProvider {
    async fn get_handle(
        &self,
        session_id: &str,
        scope: &str,
    ) -> Result<Arc<dyn MemoryHandle>, MemoryError> {
        let handle = self
            .sessions
            .entry((scope.to_string(), session_id.to_string()))
            .or_insert_with(|| {
                debug!(session_id, scope, "Creating session memory");
                Arc::new(SessionMemory::new(session_id))
            })
            .clone();
        Ok(handle)
    }

    async fn reset(&self, session_id: &str, scope: &str) -> Result<bool, MemoryError> {
        let removed = self
            .sessions
            .remove(&(scope.to_string(), session_id.to_string()))
            .is_some();
        debug!(session_id, scope, removed, "Reset session memory");
        Ok(removed)
    }
}
