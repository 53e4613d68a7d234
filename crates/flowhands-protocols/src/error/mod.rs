//! Error types for the FlowHands protocol layer.

mod definition;
mod flow;
mod memory;
mod persistence;
mod run;
mod step;
mod worker;

pub use definition::*;
pub use flow::*;
pub use memory::*;
pub use persistence::*;
pub use run::*;
pub use step::*;
pub use worker::*;
