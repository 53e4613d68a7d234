//! # FlowHands Runtime
//!
//! Ties the engine to persistence and callers.
//!
//! - [`FlowRuntime`] - run invocation, resume, polling, async runs and
//!   cancellation
//! - [`projector`] - turns a driver into a persisted, observable stream
//! - [`InMemoryMemoryProvider`] - session memory scoped per flow
//! - [`Truncation`] - payload limits for persisted and streamed events

pub mod memory;
pub mod outcome;
pub mod projector;
pub mod runtime;
pub mod truncate;

pub use memory::InMemoryMemoryProvider;
pub use outcome::{DoneEvent, ProjectedEvent, RunOutcome, StreamItem, SuspensionDescriptor};
pub use projector::ProjectedStream;
pub use runtime::FlowRuntime;
pub use truncate::Truncation;

#[cfg(test)]
mod test_flows;
