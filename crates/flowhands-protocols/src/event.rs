//! Event envelope and dispatch keys.
//!
//! Every flow speaks the same closed envelope: four built-in variants shared
//! by all flows plus one [`Event::Flow`] variant carrying the flow's own
//! routing events. Dispatch happens on [`EventKey`], never on runtime type
//! inspection.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Flow-defined routing events.
///
/// Implemented by a closed enum per flow. `tag` names the variant and is the
/// key the step graph dispatches on.
pub trait FlowEvent:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn tag(&self) -> &'static str;
}

/// Payload handed to the first step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartEvent {
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl StartEvent {
    /// Look up a string field of the input object.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(|v| v.as_str())
    }
}

/// Synthetic event injected on resume, carrying the operator's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanResponseEvent {
    pub response: String,
    pub operator: String,
}

/// Suspension request. The only event that halts the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequiredEvent {
    pub prompt: String,
    pub operator: String,
}

/// Terminal event. Its payload becomes the run result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopEvent {
    pub result: serde_json::Value,
}

impl StopEvent {
    pub fn new(result: impl Into<serde_json::Value>) -> Self {
        Self {
            result: result.into(),
        }
    }
}

/// Typed event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Event<E> {
    Start(StartEvent),
    HumanResponse(HumanResponseEvent),
    InputRequired(InputRequiredEvent),
    Flow(E),
    Stop(StopEvent),
}

impl<E: FlowEvent> Event<E> {
    pub fn key(&self) -> EventKey {
        match self {
            Event::Start(_) => EventKey::Start,
            Event::HumanResponse(_) => EventKey::HumanResponse,
            Event::InputRequired(_) => EventKey::InputRequired,
            Event::Flow(e) => EventKey::Flow(e.tag()),
            Event::Stop(_) => EventKey::Stop,
        }
    }

    pub fn stop(result: impl Into<serde_json::Value>) -> Self {
        Event::Stop(StopEvent::new(result))
    }

    pub fn input_required(prompt: impl Into<String>, operator: impl Into<String>) -> Self {
        Event::InputRequired(InputRequiredEvent {
            prompt: prompt.into(),
            operator: operator.into(),
        })
    }
}

/// Dispatch key of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKey {
    Start,
    HumanResponse,
    InputRequired,
    Flow(&'static str),
    Stop,
}

impl EventKey {
    /// Keys that no step may consume.
    pub fn is_reserved(&self) -> bool {
        matches!(self, EventKey::InputRequired | EventKey::Stop)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKey::Start => "start",
            EventKey::HumanResponse => "human_response",
            EventKey::InputRequired => "input_required",
            EventKey::Flow(tag) => tag,
            EventKey::Stop => "stop",
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
