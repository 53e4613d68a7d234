//! `echo_flow`: greets the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use flowhands_core::context::StepContext;
use flowhands_core::flow::FlowDefinition;
use flowhands_core::graph::{FlowGraph, Step};
use flowhands_protocols::error::{DefinitionError, StepError};
use flowhands_protocols::event::{Event, EventKey, FlowEvent};

pub const ECHO_FLOW: &str = "echo_flow";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EchoEvent {
    Greet { name: String },
}

impl FlowEvent for EchoEvent {
    fn tag(&self) -> &'static str {
        match self {
            EchoEvent::Greet { .. } => "greet",
        }
    }
}

const GREET: EventKey = EventKey::Flow("greet");

struct StartStep;

#[async_trait]
impl Step<EchoEvent> for StartStep {
    fn name(&self) -> &str {
        "start"
    }

    fn accepts(&self) -> Vec<EventKey> {
        vec![EventKey::Start]
    }

    fn emits(&self) -> Vec<EventKey> {
        vec![GREET]
    }

    async fn run(
        &self,
        _ctx: &mut StepContext<'_>,
        event: Event<EchoEvent>,
    ) -> Result<Vec<Event<EchoEvent>>, StepError> {
        let Event::Start(start) = event else {
            return Ok(vec![]);
        };
        let name = start
            .input_str("name")
            .ok_or_else(|| StepError::MissingInput("name".to_string()))?;
        Ok(vec![Event::Flow(EchoEvent::Greet {
            name: name.to_string(),
        })])
    }
}

struct GreetStep;

#[async_trait]
impl Step<EchoEvent> for GreetStep {
    fn name(&self) -> &str {
        "greet"
    }

    fn accepts(&self) -> Vec<EventKey> {
        vec![GREET]
    }

    fn emits(&self) -> Vec<EventKey> {
        vec![EventKey::Stop]
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        event: Event<EchoEvent>,
    ) -> Result<Vec<Event<EchoEvent>>, StepError> {
        let Event::Flow(EchoEvent::Greet { name }) = event else {
            return Ok(vec![]);
        };
        debug!(run_id = %ctx.run_id(), %name, "Greeting");
        ctx.write_event_to_stream("greeting", json!({ "name": name }));
        Ok(vec![Event::stop(format!("Hello, {}", name))])
    }
}

pub fn echo_flow() -> Result<FlowDefinition<EchoEvent>, DefinitionError> {
    let graph = FlowGraph::builder(ECHO_FLOW)
        .step(StartStep)
        .step(GreetStep)
        .build()?;
    Ok(FlowDefinition::new(
        graph,
        "Greets the caller by the `name` in its input",
    ))
}
