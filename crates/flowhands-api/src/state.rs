//! Application state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use flowhands_runtime::FlowRuntime;

/// State shared across handlers.
pub struct AppState {
    pub runtime: Arc<FlowRuntime>,
    start_time: Instant,
}

impl AppState {
    pub fn new(runtime: Arc<FlowRuntime>) -> Self {
        Self {
            runtime,
            start_time: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
