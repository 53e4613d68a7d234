//! `confirm_flow`: asks an operator before proceeding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use flowhands_core::context::StepContext;
use flowhands_core::flow::FlowDefinition;
use flowhands_core::graph::{FlowGraph, Step};
use flowhands_protocols::error::{DefinitionError, StepError};
use flowhands_protocols::event::{Event, EventKey, FlowEvent};

pub const CONFIRM_FLOW: &str = "confirm_flow";
pub const CONFIRM_PROMPT: &str = "Proceed? (yes/no)";
const DEFAULT_OPERATOR: &str = "operator";

/// The flow routes only built-in events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfirmEvent {}

impl FlowEvent for ConfirmEvent {
    fn tag(&self) -> &'static str {
        match *self {}
    }
}

struct AskStep;

#[async_trait]
impl Step<ConfirmEvent> for AskStep {
    fn name(&self) -> &str {
        "ask"
    }

    fn accepts(&self) -> Vec<EventKey> {
        vec![EventKey::Start]
    }

    fn emits(&self) -> Vec<EventKey> {
        vec![EventKey::InputRequired]
    }

    async fn run(
        &self,
        _ctx: &mut StepContext<'_>,
        event: Event<ConfirmEvent>,
    ) -> Result<Vec<Event<ConfirmEvent>>, StepError> {
        let operator = match &event {
            Event::Start(start) => start.input_str("operator").unwrap_or(DEFAULT_OPERATOR),
            _ => DEFAULT_OPERATOR,
        };
        Ok(vec![Event::input_required(CONFIRM_PROMPT, operator)])
    }
}

struct DecideStep;

#[async_trait]
impl Step<ConfirmEvent> for DecideStep {
    fn name(&self) -> &str {
        "decide"
    }

    fn accepts(&self) -> Vec<EventKey> {
        vec![EventKey::HumanResponse]
    }

    fn emits(&self) -> Vec<EventKey> {
        vec![EventKey::Stop]
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        event: Event<ConfirmEvent>,
    ) -> Result<Vec<Event<ConfirmEvent>>, StepError> {
        let Event::HumanResponse(reply) = event else {
            return Ok(vec![]);
        };
        let approved = reply.response.trim().eq_ignore_ascii_case("yes");
        info!(run_id = %ctx.run_id(), operator = %reply.operator, approved, "Operator answered");
        let verdict = if approved { "Proceeded" } else { "Aborted" };
        Ok(vec![Event::stop(verdict)])
    }
}

pub fn confirm_flow() -> Result<FlowDefinition<ConfirmEvent>, DefinitionError> {
    let graph = FlowGraph::builder(CONFIRM_FLOW)
        .step(AskStep)
        .step(DecideStep)
        .build()?;
    Ok(FlowDefinition::new(
        graph,
        "Suspends for an operator's yes/no before proceeding",
    ))
}
