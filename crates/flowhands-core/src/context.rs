//! Per-run execution context.
//!
//! A context has two halves that never mix:
//!
//! - **data**: the serializable key/value store plus engine bookkeeping
//!   (fire counts, ready queue, resolved invocations, step ordinal, active
//!   time). Everything here survives [`Context::snapshot`] /
//!   [`Context::restore`] unchanged.
//! - **resources**: live capabilities such as a memory handle. They are
//!   never serialized and must be re-attached after a restore.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use flowhands_protocols::error::{RunError, StepError};
use flowhands_protocols::event::{Event, FlowEvent};
use flowhands_protocols::memory::MemoryHandle;
use flowhands_protocols::observable::ObservableEvent;

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable key/value store of a run.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// Non-serializable capabilities attached to a run.
#[derive(Clone, Default)]
pub struct Resources {
    memory: Option<Arc<dyn MemoryHandle>>,
    extensions: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryHandle>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn memory(&self) -> Option<Arc<dyn MemoryHandle>> {
        self.memory.clone()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: Arc<T>) {
        self.extensions.insert(key.into(), value);
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.extensions.get(key).cloned()?.downcast::<T>().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.extensions.is_empty()
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resources")
            .field("memory", &self.memory.as_ref().map(|m| m.session_id().to_string()))
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A resolved step invocation that has not run yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Invocation<E> {
    pub step: String,
    pub event: Event<E>,
}

/// Portable snapshot envelope.
///
/// The header fields can be read without knowing the flow's event type,
/// which lets a caller route a snapshot to the right flow before restoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub version: u32,
    pub flow: String,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Suspension this snapshot was taken for. Lets a resume reject a
    /// snapshot that a later suspension of the same run has superseded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub state: serde_json::Value,
}

impl ContextSnapshot {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, RunError> {
        let snapshot: ContextSnapshot = serde_json::from_value(value.clone())
            .map_err(|e| RunError::InvalidSnapshot(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RunError::InvalidSnapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

#[derive(Serialize, Deserialize)]
struct ContextState<E> {
    data: DataMap,
    fired: BTreeMap<String, u32>,
    queue: VecDeque<Event<E>>,
    pending: VecDeque<Invocation<E>>,
    next_index: u32,
    active_ms: u64,
}

/// Execution context owned by one run.
#[derive(Clone)]
pub struct Context<E> {
    run_id: String,
    session_id: Option<String>,
    data: DataMap,
    fired: BTreeMap<String, u32>,
    pub(crate) queue: VecDeque<Event<E>>,
    pub(crate) pending: VecDeque<Invocation<E>>,
    pub(crate) next_index: u32,
    pub(crate) active_ms: u64,
    resources: Resources,
}

impl<E: FlowEvent> Context<E> {
    pub fn new(run_id: impl Into<String>, session_id: Option<String>) -> Self {
        let mut data = DataMap::new();
        if let Some(session) = &session_id {
            data.insert("session_id".to_string(), serde_json::Value::from(session.clone()));
        }
        Self {
            run_id: run_id.into(),
            session_id,
            data,
            fired: BTreeMap::new(),
            queue: VecDeque::new(),
            pending: VecDeque::new(),
            next_index: 0,
            active_ms: 0,
            resources: Resources::default(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn data(&self) -> &DataMap {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Attach live capabilities. Replaces whatever was attached before.
    pub fn attach_resources(&mut self, resources: Resources) {
        self.resources = resources;
    }

    /// How many times a step has been invoked in this run.
    pub fn fired(&self, step: &str) -> u32 {
        self.fired.get(step).copied().unwrap_or(0)
    }

    /// Ordinal the next step invocation will receive.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Accumulated time spent inside steps.
    pub fn active_ms(&self) -> u64 {
        self.active_ms
    }

    /// Number of events waiting to be routed.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of resolved invocations waiting to run.
    pub fn pending_invocations(&self) -> usize {
        self.pending.len()
    }

    pub fn enqueue(&mut self, event: Event<E>) {
        self.queue.push_back(event);
    }

    /// Put an event at the head of the ready queue.
    pub fn enqueue_front(&mut self, event: Event<E>) {
        self.queue.push_front(event);
    }

    pub(crate) fn begin_invocation(&mut self, step: &str) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        *self.fired.entry(step.to_string()).or_insert(0) += 1;
        index
    }

    /// Borrow the parts of the context a step may touch.
    pub fn step_context<'a>(&'a mut self, step: &'a str) -> StepContext<'a> {
        StepContext {
            step,
            run_id: &self.run_id,
            session_id: self.session_id.as_deref(),
            data: &mut self.data,
            resources: &self.resources,
            progress: Vec::new(),
        }
    }

    /// Serialize everything except resources.
    pub fn snapshot(&self, flow: &str) -> Result<serde_json::Value, RunError> {
        self.snapshot_with(flow, None)
    }

    /// Snapshot stamped with the suspension it belongs to.
    pub fn suspension_snapshot(
        &self,
        flow: &str,
        workflow_id: &str,
    ) -> Result<serde_json::Value, RunError> {
        self.snapshot_with(flow, Some(workflow_id))
    }

    fn snapshot_with(
        &self,
        flow: &str,
        workflow_id: Option<&str>,
    ) -> Result<serde_json::Value, RunError> {
        let state = ContextState {
            data: self.data.clone(),
            fired: self.fired.clone(),
            queue: self.queue.clone(),
            pending: self.pending.clone(),
            next_index: self.next_index,
            active_ms: self.active_ms,
        };
        let snapshot = ContextSnapshot {
            version: SNAPSHOT_VERSION,
            flow: flow.to_string(),
            run_id: self.run_id.clone(),
            session_id: self.session_id.clone(),
            workflow_id: workflow_id.map(str::to_string),
            state: serde_json::to_value(state)
                .map_err(|e| RunError::InvalidSnapshot(e.to_string()))?,
        };
        serde_json::to_value(snapshot).map_err(|e| RunError::InvalidSnapshot(e.to_string()))
    }

    /// Rebuild a context from a snapshot taken for `flow`.
    ///
    /// The restored context has no resources attached.
    pub fn restore(flow: &str, value: &serde_json::Value) -> Result<Self, RunError> {
        let snapshot = ContextSnapshot::from_value(value)?;
        if snapshot.flow != flow {
            return Err(RunError::InvalidSnapshot(format!(
                "snapshot belongs to flow '{}', not '{}'",
                snapshot.flow, flow
            )));
        }
        let state: ContextState<E> = serde_json::from_value(snapshot.state)
            .map_err(|e| RunError::InvalidSnapshot(e.to_string()))?;

        Ok(Self {
            run_id: snapshot.run_id,
            session_id: snapshot.session_id,
            data: state.data,
            fired: state.fired,
            queue: state.queue,
            pending: state.pending,
            next_index: state.next_index,
            active_ms: state.active_ms,
            resources: Resources::default(),
        })
    }
}

impl<E> fmt::Debug for Context<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("run_id", &self.run_id)
            .field("session_id", &self.session_id)
            .field("data", &self.data)
            .field("fired", &self.fired)
            .field("queued", &self.queue.len())
            .field("pending", &self.pending.len())
            .field("next_index", &self.next_index)
            .field("active_ms", &self.active_ms)
            .field("resources", &self.resources)
            .finish()
    }
}

/// What a step sees of its run while it executes.
pub struct StepContext<'a> {
    step: &'a str,
    run_id: &'a str,
    session_id: Option<&'a str>,
    data: &'a mut DataMap,
    resources: &'a Resources,
    progress: Vec<ObservableEvent>,
}

impl<'a> StepContext<'a> {
    pub fn step_name(&self) -> &str {
        self.step
    }

    pub fn run_id(&self) -> &str {
        self.run_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Read a stored value as `T`. Missing keys yield `Ok(None)`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StepError> {
        match self.data.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<(), StepError> {
        self.data.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    pub fn memory(&self) -> Option<Arc<dyn MemoryHandle>> {
        self.resources.memory()
    }

    pub fn resource<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.resources.get(key)
    }

    /// Surface a progress event to stream consumers.
    pub fn write_event_to_stream(&mut self, name: impl Into<String>, data: serde_json::Value) {
        self.progress.push(ObservableEvent::Progress {
            step: self.step.to_string(),
            name: name.into(),
            data,
        });
    }

    pub(crate) fn into_progress(self) -> Vec<ObservableEvent> {
        self.progress
    }
}
