//! Flow definitions.
//!
//! A [`FlowDefinition`] is generic over its event type. The registry and the
//! runtime work with flows of different event types side by side, so each
//! definition is also usable through the object-safe [`FlowHandle`], which
//! hands out type-erased drivers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use flowhands_protocols::error::RunError;
use flowhands_protocols::event::{FlowEvent, HumanResponseEvent};
use flowhands_protocols::observable::ObservableEvent;

use crate::context::Resources;
use crate::graph::FlowGraph;
use crate::scheduler::{DriveResult, DriverState, RunDriver};

/// An immutable, validated flow.
pub struct FlowDefinition<E: FlowEvent> {
    name: String,
    description: String,
    timeout: Option<Duration>,
    graph: Arc<FlowGraph<E>>,
}

impl<E: FlowEvent> FlowDefinition<E> {
    pub fn new(graph: FlowGraph<E>, description: impl Into<String>) -> Self {
        Self {
            name: graph.name().to_string(),
            description: description.into(),
            timeout: None,
            graph: Arc::new(graph),
        }
    }

    /// Override the runtime's default run timeout for this flow.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn graph(&self) -> &Arc<FlowGraph<E>> {
        &self.graph
    }

    pub fn start_driver(
        &self,
        run_id: &str,
        input: serde_json::Value,
        session_id: Option<String>,
        resources: Resources,
        timeout: Duration,
    ) -> RunDriver<E> {
        RunDriver::start(
            Arc::clone(&self.graph),
            run_id,
            input,
            session_id,
            resources,
            timeout,
        )
    }

    pub fn resume_driver(
        &self,
        snapshot: &serde_json::Value,
        response: HumanResponseEvent,
        resources: Resources,
        timeout: Duration,
    ) -> Result<RunDriver<E>, RunError> {
        RunDriver::resume(Arc::clone(&self.graph), snapshot, response, resources, timeout)
    }
}

/// Object-safe view of a driver.
#[async_trait]
pub trait ErasedDriver: Send {
    fn run_id(&self) -> &str;

    fn state(&self) -> DriverState;

    fn steps_invoked(&self) -> u32;

    async fn next_event(&mut self) -> Option<ObservableEvent>;

    fn take_outcome(&mut self) -> Option<DriveResult>;
}

#[async_trait]
impl<E: FlowEvent> ErasedDriver for RunDriver<E> {
    fn run_id(&self) -> &str {
        RunDriver::run_id(self)
    }

    fn state(&self) -> DriverState {
        RunDriver::state(self)
    }

    fn steps_invoked(&self) -> u32 {
        RunDriver::steps_invoked(self)
    }

    async fn next_event(&mut self) -> Option<ObservableEvent> {
        self.next().await
    }

    fn take_outcome(&mut self) -> Option<DriveResult> {
        RunDriver::take_outcome(self)
    }
}

/// Object-safe view of a flow definition.
pub trait FlowHandle: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Flow-specific timeout, if any.
    fn timeout(&self) -> Option<Duration>;

    fn step_names(&self) -> Vec<String>;

    fn start(
        &self,
        run_id: &str,
        input: serde_json::Value,
        session_id: Option<String>,
        resources: Resources,
        timeout: Duration,
    ) -> Box<dyn ErasedDriver>;

    fn resume(
        &self,
        snapshot: &serde_json::Value,
        response: HumanResponseEvent,
        resources: Resources,
        timeout: Duration,
    ) -> Result<Box<dyn ErasedDriver>, RunError>;
}

impl<E: FlowEvent> FlowHandle for FlowDefinition<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn step_names(&self) -> Vec<String> {
        self.graph.step_names().into_iter().map(String::from).collect()
    }

    fn start(
        &self,
        run_id: &str,
        input: serde_json::Value,
        session_id: Option<String>,
        resources: Resources,
        timeout: Duration,
    ) -> Box<dyn ErasedDriver> {
        Box::new(self.start_driver(run_id, input, session_id, resources, timeout))
    }

    fn resume(
        &self,
        snapshot: &serde_json::Value,
        response: HumanResponseEvent,
        resources: Resources,
        timeout: Duration,
    ) -> Result<Box<dyn ErasedDriver>, RunError> {
        Ok(Box::new(self.resume_driver(snapshot, response, resources, timeout)?))
    }
}
