//! Flow registry.
//!
//! Constructed once at startup and shared by `Arc`; there is no global
//! instance.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use flowhands_protocols::error::DefinitionError;

use crate::flow::FlowHandle;

/// Listing entry for a registered flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

pub struct FlowRegistry {
    flows: DashMap<String, Arc<dyn FlowHandle>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self {
            flows: DashMap::new(),
        }
    }

    /// Register a flow. Names must be unique.
    pub fn register<F: FlowHandle + 'static>(&self, flow: F) -> Result<(), DefinitionError> {
        self.register_arc(Arc::new(flow))
    }

    pub fn register_arc(&self, flow: Arc<dyn FlowHandle>) -> Result<(), DefinitionError> {
        let id = flow.name().to_string();
        if self.flows.contains_key(&id) {
            return Err(DefinitionError::DuplicateFlow(id));
        }
        self.flows.insert(id, flow);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn FlowHandle>> {
        self.flows.get(id).map(|flow| flow.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.flows.contains_key(id)
    }

    /// All flows, sorted by id.
    pub fn list(&self) -> Vec<FlowInfo> {
        let mut flows: Vec<FlowInfo> = self
            .flows
            .iter()
            .map(|entry| FlowInfo {
                id: entry.key().clone(),
                name: display_name(entry.key()),
                description: entry.value().description().to_string(),
            })
            .collect();
        flows.sort_by(|a, b| a.id.cmp(&b.id));
        flows
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

impl Default for FlowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `story_critic_flow` -> `Story Critic Flow`.
fn display_name(id: &str) -> String {
    id.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use flowhands_protocols::error::StepError;
    use flowhands_protocols::event::{Event, EventKey, FlowEvent};

    use crate::context::StepContext;
    use crate::flow::FlowDefinition;
    use crate::graph::{FlowGraph, Step};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum Never {}

    impl FlowEvent for Never {
        fn tag(&self) -> &'static str {
            match *self {}
        }
    }

    struct Finish;

    #[async_trait]
    impl Step<Never> for Finish {
        fn name(&self) -> &str {
            "finish"
        }

        fn accepts(&self) -> Vec<EventKey> {
            vec![EventKey::Start]
        }

        fn emits(&self) -> Vec<EventKey> {
            vec![EventKey::Stop]
        }

        async fn run(
            &self,
            _ctx: &mut StepContext<'_>,
            _event: Event<Never>,
        ) -> Result<Vec<Event<Never>>, StepError> {
            Ok(vec![Event::stop("done")])
        }
    }

    fn flow(name: &str) -> FlowDefinition<Never> {
        let graph = FlowGraph::builder(name).step(Finish).build().unwrap();
        FlowDefinition::new(graph, format!("{} description", name))
    }

    #[test]
    fn test_register_and_get() {
        let registry = FlowRegistry::new();
        registry.register(flow("story_critic_flow")).unwrap();

        assert!(registry.contains("story_critic_flow"));
        let handle = registry.get("story_critic_flow").unwrap();
        assert_eq!(handle.name(), "story_critic_flow");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = FlowRegistry::new();
        registry.register(flow("echo_flow")).unwrap();
        let err = registry.register(flow("echo_flow")).unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateFlow("echo_flow".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_is_sorted_with_display_names() {
        let registry = FlowRegistry::new();
        registry.register(flow("story_flow")).unwrap();
        registry.register(flow("echo_flow")).unwrap();

        let flows = registry.list();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].id, "echo_flow");
        assert_eq!(flows[0].name, "Echo Flow");
        assert_eq!(flows[1].name, "Story Flow");
        assert_eq!(flows[1].description, "story_flow description");
    }

    #[test]
    fn test_flow_timeout_override() {
        let flow = flow("slow_flow").with_timeout(Duration::from_secs(900));
        assert_eq!(FlowHandle::timeout(&flow), Some(Duration::from_secs(900)));
    }
}
