//! Shared fixtures for the engine tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use flowhands_protocols::error::StepError;
use flowhands_protocols::event::{Event, EventKey, FlowEvent};

use crate::context::StepContext;
use crate::graph::{FlowGraph, Step};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestEvent {
    Greet { name: String },
    Note { text: String },
}

impl FlowEvent for TestEvent {
    fn tag(&self) -> &'static str {
        match self {
            TestEvent::Greet { .. } => "greet",
            TestEvent::Note { .. } => "note",
        }
    }
}

pub const GREET: EventKey = EventKey::Flow("greet");
pub const NOTE: EventKey = EventKey::Flow("note");

type Handler = dyn Fn(&mut StepContext<'_>, Event<TestEvent>) -> Result<Vec<Event<TestEvent>>, StepError>
    + Send
    + Sync;

/// Step backed by a synchronous closure, counting its invocations.
pub struct FnStep {
    name: String,
    accepts: Vec<EventKey>,
    emits: Vec<EventKey>,
    handler: Box<Handler>,
    pub calls: Arc<AtomicU32>,
}

impl FnStep {
    pub fn new<F>(name: &str, accepts: Vec<EventKey>, emits: Vec<EventKey>, handler: F) -> Self
    where
        F: Fn(&mut StepContext<'_>, Event<TestEvent>) -> Result<Vec<Event<TestEvent>>, StepError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            accepts,
            emits,
            handler: Box::new(handler),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl Step<TestEvent> for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self) -> Vec<EventKey> {
        self.accepts.clone()
    }

    fn emits(&self) -> Vec<EventKey> {
        self.emits.clone()
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        event: Event<TestEvent>,
    ) -> Result<Vec<Event<TestEvent>>, StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(ctx, event)
    }
}

/// `start -> greet -> Stop("Hello, {name}")`.
pub fn echo_graph() -> FlowGraph<TestEvent> {
    FlowGraph::builder("echo_flow")
        .step(FnStep::new(
            "start",
            vec![EventKey::Start],
            vec![GREET],
            |_ctx, event| match event {
                Event::Start(start) => {
                    let name = start
                        .input_str("name")
                        .ok_or_else(|| StepError::MissingInput("name".to_string()))?;
                    Ok(vec![Event::Flow(TestEvent::Greet {
                        name: name.to_string(),
                    })])
                }
                _ => Ok(vec![]),
            },
        ))
        .step(FnStep::new(
            "greet",
            vec![GREET],
            vec![EventKey::Stop],
            |_ctx, event| match event {
                Event::Flow(TestEvent::Greet { name }) => {
                    Ok(vec![Event::stop(format!("Hello, {}", name))])
                }
                _ => Ok(vec![]),
            },
        ))
        .build()
        .unwrap()
}

/// `ask` suspends with "Proceed? (yes/no)", `decide` answers on the response.
pub fn confirm_graph() -> FlowGraph<TestEvent> {
    FlowGraph::builder("confirm_flow")
        .step(FnStep::new(
            "ask",
            vec![EventKey::Start],
            vec![EventKey::InputRequired],
            |ctx, _event| {
                ctx.set("asked", true)?;
                Ok(vec![Event::input_required("Proceed? (yes/no)", "operator")])
            },
        ))
        .step(FnStep::new(
            "decide",
            vec![EventKey::HumanResponse],
            vec![EventKey::Stop],
            |ctx, event| match event {
                Event::HumanResponse(reply) => {
                    let asked = ctx.get_as::<bool>("asked")?.unwrap_or(false);
                    let verdict = if asked && reply.response.trim().eq_ignore_ascii_case("yes") {
                        "Proceeded"
                    } else {
                        "Aborted"
                    };
                    Ok(vec![Event::stop(verdict)])
                }
                _ => Ok(vec![]),
            },
        ))
        .build()
        .unwrap()
}
