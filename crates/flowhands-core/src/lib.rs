//! # FlowHands Core
//!
//! The resumable execution engine:
//!
//! - [`graph`] - Step trait, flow graph and registration-time validation
//! - [`context`] - Per-run execution context with snapshot/restore
//! - [`scheduler`] - Cooperative single-run driver
//! - [`flow`] - Flow definitions behind a type-erased handle
//! - [`registry`] - Explicit flow registry value

pub mod context;
pub mod flow;
pub mod graph;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use context::{Context, ContextSnapshot, Resources, StepContext};
pub use flow::{ErasedDriver, FlowDefinition, FlowHandle};
pub use graph::{FlowGraph, FlowGraphBuilder, Step};
pub use registry::{FlowInfo, FlowRegistry};
pub use scheduler::{DriveResult, DriverState, RunDriver, Suspension};
