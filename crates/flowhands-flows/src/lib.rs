//! # FlowHands Flows
//!
//! Built-in flows and the offline workers they run with.
//!
//! - `echo_flow` - `start -> greet -> "Hello, {name}"`
//! - `confirm_flow` - suspends for an operator's yes/no
//! - `story_flow` - research, then write
//! - `story_critic_flow` - research, write, then critique and rewrite until
//!   approved or out of attempts

pub mod confirm;
pub mod echo;
pub mod story;
pub mod workers;

use flowhands_core::registry::FlowRegistry;
use flowhands_protocols::error::DefinitionError;

pub use confirm::{ConfirmEvent, confirm_flow};
pub use echo::{EchoEvent, echo_flow};
pub use story::{StoryEvent, StoryWorkers, story_critic_flow, story_flow};
pub use workers::{EchoWorker, ScriptedWorker};

/// Registry holding every built-in flow, with the story flows bound to
/// `workers`.
pub fn builtin_registry(workers: &StoryWorkers) -> Result<FlowRegistry, DefinitionError> {
    let registry = FlowRegistry::new();
    registry.register(echo_flow()?)?;
    registry.register(confirm_flow()?)?;
    registry.register(story_flow(workers)?)?;
    registry.register(story_critic_flow(workers)?)?;
    tracing::debug!("Registered {} built-in flows", registry.len());
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use flowhands_core::context::Resources;
    use flowhands_core::scheduler::DriveResult;
    use flowhands_protocols::event::HumanResponseEvent;

    fn registry() -> FlowRegistry {
        builtin_registry(&StoryWorkers::offline()).unwrap()
    }

    async fn finish(
        mut driver: Box<dyn flowhands_core::flow::ErasedDriver>,
    ) -> Option<DriveResult> {
        while driver.next_event().await.is_some() {}
        driver.take_outcome()
    }

    #[test]
    fn test_builtin_flows_listed() {
        let mut ids: Vec<String> = registry().list().into_iter().map(|f| f.id).collect();
        ids.sort();
        assert_eq!(
            ids,
            vec!["confirm_flow", "echo_flow", "story_critic_flow", "story_flow"]
        );
    }

    #[tokio::test]
    async fn test_echo_greets_ada() {
        let flow = registry().get("echo_flow").unwrap();
        let driver = flow.start(
            "run-1",
            json!({"name": "Ada"}),
            None,
            Resources::new(),
            Duration::from_secs(5),
        );
        assert_eq!(
            finish(driver).await,
            Some(DriveResult::Completed(json!("Hello, Ada")))
        );
    }

    #[tokio::test]
    async fn test_confirm_round_trip() {
        let flow = registry().get("confirm_flow").unwrap();
        for (answer, verdict) in [("yes", "Proceeded"), ("no", "Aborted"), (" YES ", "Proceeded")] {
            let driver = flow.start(
                "run-1",
                json!({"operator": "alice"}),
                None,
                Resources::new(),
                Duration::from_secs(5),
            );
            let suspension = match finish(driver).await {
                Some(DriveResult::Suspended(suspension)) => suspension,
                other => panic!("expected suspension, got {:?}", other),
            };
            assert_eq!(suspension.prompt, confirm::CONFIRM_PROMPT);
            assert_eq!(suspension.operator, "alice");

            let resumed = flow
                .resume(
                    &suspension.snapshot,
                    HumanResponseEvent {
                        response: answer.to_string(),
                        operator: "alice".to_string(),
                    },
                    Resources::new(),
                    Duration::from_secs(5),
                )
                .unwrap();
            assert_eq!(
                finish(resumed).await,
                Some(DriveResult::Completed(json!(verdict)))
            );
        }
    }
}
