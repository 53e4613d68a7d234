//! Events surfaced to stream consumers.

use serde::{Deserialize, Serialize};

/// Observable event produced while a run advances.
///
/// Internal routing events never appear here. The scheduler wraps every step
/// invocation in `StepStarted`/`StepCompleted`; steps add `Progress` events
/// through their context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservableEvent {
    StepStarted {
        step: String,
        index: u32,
        details: String,
    },
    StepCompleted {
        step: String,
        index: u32,
        status: String,
        data: serde_json::Value,
        duration_ms: u64,
    },
    Progress {
        step: String,
        name: String,
        data: serde_json::Value,
    },
    InputRequired {
        prompt: String,
        operator: String,
        workflow_id: String,
    },
    Stopped {
        result: serde_json::Value,
    },
}

impl ObservableEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ObservableEvent::StepStarted { .. } => "step_started",
            ObservableEvent::StepCompleted { .. } => "step_completed",
            ObservableEvent::Progress { .. } => "progress",
            ObservableEvent::InputRequired { .. } => "input_required",
            ObservableEvent::Stopped { .. } => "stopped",
        }
    }

    pub fn step(&self) -> Option<&str> {
        match self {
            ObservableEvent::StepStarted { step, .. }
            | ObservableEvent::StepCompleted { step, .. }
            | ObservableEvent::Progress { step, .. } => Some(step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_matches_serde_tag() {
        let event = ObservableEvent::StepStarted {
            step: "greet".to_string(),
            index: 1,
            details: "greeted".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(event.step(), Some("greet"));
    }

    #[test]
    fn test_stopped_has_no_step() {
        let event = ObservableEvent::Stopped {
            result: serde_json::json!("Hello, Ada"),
        };
        assert_eq!(event.step(), None);
        assert_eq!(event.event_type(), "stopped");
    }
}
