//! # FlowHands Protocols
//!
//! Protocol definitions for the FlowHands flow runtime.
//! Contains only interface definitions and plain records - no engine logic.
//!
//! ## Contents
//!
//! - [`Event`] / [`EventKey`] - Typed event envelope and its dispatch key
//! - [`ObservableEvent`] - Events surfaced to stream consumers
//! - [`StepWorker`] - Capability a step uses to reach a model or tool backend
//! - [`MemoryProvider`] / [`MemoryHandle`] - Conversation memory capability
//! - [`RunRecord`] / [`StepRecord`] / [`SuspensionRecord`] - Persisted records
//! - [`RunStore`] / [`SuspensionStore`] - Persistence interfaces

pub mod error;
pub mod event;
pub mod memory;
pub mod observable;
pub mod record;
pub mod store;
pub mod worker;

pub use error::{
    DefinitionError, FlowError, MemoryError, PersistenceError, RunError, StepError, WorkerError,
};
pub use event::{
    Event, EventKey, FlowEvent, HumanResponseEvent, InputRequiredEvent, StartEvent, StopEvent,
};
pub use memory::{MemoryHandle, MemoryMessage, MemoryProvider};
pub use observable::ObservableEvent;
pub use record::{
    RunRecord, RunStatus, StatusUpdate, StepCompletion, StepRecord, StepStatus, SuspensionRecord,
    SuspensionStatus,
};
pub use store::{FlowStore, RunStore, SuspensionStore};
pub use worker::{StepWorker, TextStream, WorkerOutput, WorkerRequest};
