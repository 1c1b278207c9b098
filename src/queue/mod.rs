//! `ChangeQueue`: the ordered, windowed sequence of items within a pipeline.

pub mod change_queue;

pub use change_queue::{ChangeQueue, Enqueued};
