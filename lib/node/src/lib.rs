//! The node lifecycle engine.
//!
//! Every node in a pipeline, whatever its kind, is driven by the same
//! state machine: wait for the run to start, wait for predecessors,
//! prepare, execute, then signal successors. Kind-specific behaviour
//! lives behind [`base::NodeStrategy`].

pub mod base;
pub mod engine;
pub mod signal;
pub mod status;

mod id;
pub use id::{identity, PipelineId};
