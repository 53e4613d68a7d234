//! Flow definition errors, raised at registration time only.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("Flow '{0}' has no steps")]
    Empty(String),

    #[error("Duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("Duplicate flow: {0}")]
    DuplicateFlow(String),

    #[error("No step consumes the start event")]
    NoStartConsumer,

    #[error("Step '{step}' emits '{event}' but no step consumes it")]
    DanglingEvent { step: String, event: String },

    #[error("Step '{step}' requests human input but no step consumes the response")]
    MissingResponseConsumer { step: String },

    #[error("Step '{step}' cannot consume reserved event '{event}'")]
    ReservedEvent { step: String, event: String },

    #[error("Step '{0}' is unreachable from the start event")]
    UnreachableStep(String),

    #[error("No terminal event is reachable from the start event")]
    NoTerminal,
}
