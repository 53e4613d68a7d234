//! Small flows used by the runtime tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use flowhands_core::context::StepContext;
use flowhands_core::flow::FlowDefinition;
use flowhands_core::graph::{FlowGraph, Step};
use flowhands_core::registry::FlowRegistry;
use flowhands_protocols::error::StepError;
use flowhands_protocols::event::{Event, EventKey, FlowEvent};
use flowhands_protocols::memory::MemoryMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestEvent {
    Greet { name: String },
    Tick { n: u32 },
}

impl FlowEvent for TestEvent {
    fn tag(&self) -> &'static str {
        match self {
            TestEvent::Greet { .. } => "greet",
            TestEvent::Tick { .. } => "tick",
        }
    }
}

const GREET: EventKey = EventKey::Flow("greet");
const TICK: EventKey = EventKey::Flow("tick");

type Handler = dyn Fn(&mut StepContext<'_>, Event<TestEvent>) -> Result<Vec<Event<TestEvent>>, StepError>
    + Send
    + Sync;

/// Closure step with an optional delay before the handler runs.
pub struct TestStep {
    name: &'static str,
    accepts: Vec<EventKey>,
    emits: Vec<EventKey>,
    delay: Option<Duration>,
    remember: bool,
    handler: Box<Handler>,
}

impl TestStep {
    pub fn new<F>(name: &'static str, accepts: Vec<EventKey>, emits: Vec<EventKey>, handler: F) -> Self
    where
        F: Fn(&mut StepContext<'_>, Event<TestEvent>) -> Result<Vec<Event<TestEvent>>, StepError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name,
            accepts,
            emits,
            delay: None,
            remember: false,
            handler: Box::new(handler),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append the step name to session memory when a handle is attached.
    pub fn remembering(mut self) -> Self {
        self.remember = true;
        self
    }
}

#[async_trait]
impl Step<TestEvent> for TestStep {
    fn name(&self) -> &str {
        self.name
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
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.remember {
            if let Some(memory) = ctx.memory() {
                memory.put(MemoryMessage::new("assistant", self.name)).await?;
            }
        }
        (self.handler)(ctx, event)
    }
}

/// `start -> greet -> Stop("Hello, {name}")`.
pub fn echo_flow() -> FlowDefinition<TestEvent> {
    let graph = FlowGraph::builder("echo_flow")
        .step(
            TestStep::new("start", vec![EventKey::Start], vec![GREET], |_ctx, event| {
                match event {
                    Event::Start(start) => {
                        let name = start
                            .input_str("name")
                            .ok_or_else(|| StepError::MissingInput("name".to_string()))?;
                        Ok(vec![Event::Flow(TestEvent::Greet {
                            name: name.to_string(),
                        })])
                    }
                    _ => Ok(vec![]),
                }
            })
            .remembering(),
        )
        .step(
            TestStep::new("greet", vec![GREET], vec![EventKey::Stop], |ctx, event| {
                match event {
                    Event::Flow(TestEvent::Greet { name }) => {
                        ctx.write_event_to_stream("greeting", serde_json::json!({ "name": name }));
                        Ok(vec![Event::stop(format!("Hello, {}", name))])
                    }
                    _ => Ok(vec![]),
                }
            })
            .remembering(),
        )
        .build()
        .unwrap();
    FlowDefinition::new(graph, "Greets the caller")
}

/// `ask` suspends, `decide` answers "Proceeded" or "Aborted"; "again"
/// asks once more.
pub fn confirm_flow() -> FlowDefinition<TestEvent> {
    let graph = FlowGraph::builder("confirm_flow")
        .step(TestStep::new(
            "ask",
            vec![EventKey::Start],
            vec![EventKey::InputRequired],
            |ctx, event| {
                let operator = match &event {
                    Event::Start(start) => start.input_str("operator").unwrap_or("operator"),
                    _ => "operator",
                }
                .to_string();
                ctx.set("operator", &operator)?;
                Ok(vec![Event::input_required("Proceed? (yes/no)", operator)])
            },
        ))
        .step(TestStep::new(
            "decide",
            vec![EventKey::HumanResponse],
            vec![EventKey::Stop, EventKey::InputRequired],
            |ctx, event| match event {
                Event::HumanResponse(reply) => {
                    let answer = reply.response.trim().to_lowercase();
                    if answer == "again" {
                        let operator = ctx
                            .get_as::<String>("operator")?
                            .unwrap_or_else(|| "operator".to_string());
                        return Ok(vec![Event::input_required("Really proceed?", operator)]);
                    }
                    let verdict = if answer == "yes" { "Proceeded" } else { "Aborted" };
                    Ok(vec![Event::stop(verdict)])
                }
                _ => Ok(vec![]),
            },
        ))
        .build()
        .unwrap();
    FlowDefinition::new(graph, "Asks the operator before proceeding")
}

/// Ticks `count` times with a delay per tick, then stops.
pub fn slow_flow() -> FlowDefinition<TestEvent> {
    let graph = FlowGraph::builder("slow_flow")
        .step(TestStep::new(
            "begin",
            vec![EventKey::Start],
            vec![TICK],
            |_ctx, _event| Ok(vec![Event::Flow(TestEvent::Tick { n: 0 })]),
        ))
        .step(
            TestStep::new("tick", vec![TICK], vec![TICK, EventKey::Stop], |_ctx, event| {
                match event {
                    Event::Flow(TestEvent::Tick { n }) if n < 5 => {
                        Ok(vec![Event::Flow(TestEvent::Tick { n: n + 1 })])
                    }
                    _ => Ok(vec![Event::stop("done")]),
                }
            })
            .with_delay(Duration::from_millis(50)),
        )
        .build()
        .unwrap();
    FlowDefinition::new(graph, "Ticks slowly")
}

/// Always fails in its only step.
pub fn failing_flow() -> FlowDefinition<TestEvent> {
    let graph = FlowGraph::builder("failing_flow")
        .step(TestStep::new(
            "explode",
            vec![EventKey::Start],
            vec![EventKey::Stop],
            |_ctx, _event| Err(StepError::failed("boom")),
        ))
        .build()
        .unwrap();
    FlowDefinition::new(graph, "Fails")
}

/// Stops with a long string result.
pub fn verbose_flow(len: usize) -> FlowDefinition<TestEvent> {
    let graph = FlowGraph::builder("verbose_flow")
        .step(TestStep::new(
            "write",
            vec![EventKey::Start],
            vec![EventKey::Stop],
            move |ctx, _event| {
                let text = "x".repeat(len);
                ctx.write_event_to_stream("chunk", serde_json::json!({ "text": text }));
                Ok(vec![Event::stop(text)])
            },
        ))
        .build()
        .unwrap();
    FlowDefinition::new(graph, "Writes a lot")
}

pub fn registry() -> Arc<FlowRegistry> {
    let registry = FlowRegistry::new();
    registry.register(echo_flow()).unwrap();
    registry.register(confirm_flow()).unwrap();
    registry.register(slow_flow()).unwrap();
    registry.register(failing_flow()).unwrap();
    registry.register(verbose_flow(2_000)).unwrap();
    Arc::new(registry)
}
