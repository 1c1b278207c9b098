//! Core data model: `Change`, `QueueItem`, `BuildSet`, `Bundle`, `Pipeline`.

pub mod build_set;
pub mod bundle;
pub mod change;
pub mod pipeline;
pub mod queue_item;

pub use build_set::{AsyncState, BuildSet, JobGraph, JobResult, NodeRequest};
pub use bundle::Bundle;
pub use change::{Change, ChangeKey};
pub use pipeline::{ActionSets, Pipeline, PipelineState};
pub use queue_item::{ItemId, ItemState, QueueItem};
