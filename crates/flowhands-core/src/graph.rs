//! Step trait and flow graph.
//!
//! A [`FlowGraph`] is built once per flow definition. Building validates the
//! graph and produces the `EventKey -> steps` dispatch table the scheduler
//! routes on:
//!
//! - every step name is unique
//! - the start event has a consumer
//! - every emitted key has a consumer (stop excepted)
//! - a step requesting human input has a response consumer
//! - every step is reachable from the start event
//! - a stop event is reachable

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;

use flowhands_protocols::error::{DefinitionError, StepError};
use flowhands_protocols::event::{Event, EventKey, FlowEvent};

use crate::context::StepContext;

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;

/// A unit of execution: consumes one event, produces zero or more.
#[async_trait]
pub trait Step<E: FlowEvent>: Send + Sync {
    /// Unique step name within its flow.
    fn name(&self) -> &str;

    /// Event keys this step consumes.
    fn accepts(&self) -> Vec<EventKey>;

    /// Event keys this step may emit.
    fn emits(&self) -> Vec<EventKey>;

    /// Run the step against one event.
    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        event: Event<E>,
    ) -> Result<Vec<Event<E>>, StepError>;
}

/// Validated step graph of one flow.
pub struct FlowGraph<E: FlowEvent> {
    name: String,
    steps: Vec<Arc<dyn Step<E>>>,
    emits: Vec<HashSet<EventKey>>,
    dispatch: HashMap<EventKey, Vec<usize>>,
}

impl<E: FlowEvent> std::fmt::Debug for FlowGraph<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowGraph")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish_non_exhaustive()
    }
}

impl<E: FlowEvent> FlowGraph<E> {
    pub fn builder(name: impl Into<String>) -> FlowGraphBuilder<E> {
        FlowGraphBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indices of the steps consuming `key`, in registration order.
    pub fn resolve(&self, key: EventKey) -> &[usize] {
        self.dispatch.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn step(&self, index: usize) -> Option<&Arc<dyn Step<E>>> {
        self.steps.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name() == name)
    }

    /// Whether step `index` declared `key` among its outputs.
    pub fn declares(&self, index: usize, key: EventKey) -> bool {
        self.emits.get(index).is_some_and(|keys| keys.contains(&key))
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Collects steps, then validates them into a [`FlowGraph`].
pub struct FlowGraphBuilder<E: FlowEvent> {
    name: String,
    steps: Vec<Arc<dyn Step<E>>>,
}

impl<E: FlowEvent> FlowGraphBuilder<E> {
    pub fn step<S: Step<E> + 'static>(mut self, step: S) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn step_arc(mut self, step: Arc<dyn Step<E>>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Result<FlowGraph<E>, DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::Empty(self.name));
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            if !names.insert(step.name().to_string()) {
                return Err(DefinitionError::DuplicateStep(step.name().to_string()));
            }
        }

        let mut dispatch: HashMap<EventKey, Vec<usize>> = HashMap::new();
        for (index, step) in self.steps.iter().enumerate() {
            for key in step.accepts() {
                if key.is_reserved() {
                    return Err(DefinitionError::ReservedEvent {
                        step: step.name().to_string(),
                        event: key.to_string(),
                    });
                }
                let consumers = dispatch.entry(key).or_default();
                if !consumers.contains(&index) {
                    consumers.push(index);
                }
            }
        }

        if !dispatch.contains_key(&EventKey::Start) {
            return Err(DefinitionError::NoStartConsumer);
        }

        let emits: Vec<HashSet<EventKey>> = self
            .steps
            .iter()
            .map(|s| s.emits().into_iter().collect())
            .collect();

        for (index, keys) in emits.iter().enumerate() {
            let step = self.steps[index].name();
            let mut keys: Vec<_> = keys.iter().copied().collect();
            keys.sort();
            for key in keys {
                match key {
                    EventKey::Stop => {}
                    EventKey::InputRequired => {
                        if !dispatch.contains_key(&EventKey::HumanResponse) {
                            return Err(DefinitionError::MissingResponseConsumer {
                                step: step.to_string(),
                            });
                        }
                    }
                    other if !dispatch.contains_key(&other) => {
                        return Err(DefinitionError::DanglingEvent {
                            step: step.to_string(),
                            event: other.to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }

        // Walk event keys breadth-first from the start event.
        let mut visited = vec![false; self.steps.len()];
        let mut seen: HashSet<EventKey> = HashSet::from([EventKey::Start]);
        let mut frontier = VecDeque::from([EventKey::Start]);
        while let Some(key) = frontier.pop_front() {
            for &index in dispatch.get(&key).map(Vec::as_slice).unwrap_or(&[]) {
                if visited[index] {
                    continue;
                }
                visited[index] = true;
                for &emitted in &emits[index] {
                    let next = if emitted == EventKey::InputRequired {
                        EventKey::HumanResponse
                    } else {
                        emitted
                    };
                    if seen.insert(next) {
                        frontier.push_back(next);
                    }
                }
            }
        }

        if let Some(index) = visited.iter().position(|v| !v) {
            return Err(DefinitionError::UnreachableStep(
                self.steps[index].name().to_string(),
            ));
        }
        if !seen.contains(&EventKey::Stop) {
            return Err(DefinitionError::NoTerminal);
        }

        Ok(FlowGraph {
            name: self.name,
            steps: self.steps,
            emits,
            dispatch,
        })
    }
}
