//! # FlowHands Store
//!
//! Persistence for runs, step execution records and suspensions.
//!
//! ## Features
//!
//! - **MemoryStore**: volatile store, also the fallback when no durable
//!   store can be opened
//! - **SqliteStore**: durable store on SQLite
//! - **PersistenceWriter**: bounded write queue drained by one dedicated
//!   worker, with observable statistics

pub mod memory;
pub mod open;
pub mod retry;
pub mod schema;
pub mod sqlite;
pub mod writer;

pub use memory::MemoryStore;
pub use open::open_store;
pub use retry::RetryConfig;
pub use sqlite::SqliteStore;
pub use writer::{PersistenceWriter, WriterConfig, WriterStats};

#[cfg(test)]
#[path = "contract_tests.rs"]
mod contract_tests;
