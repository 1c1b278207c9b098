//! Distributed coordination primitives (spec §4.5, §5, §6): a
//! version-checked coordination store and the cluster-wide counting
//! semaphore built on top of it.

pub mod coordination;
pub mod handler;

pub use coordination::{CoordinationStore, FileCoordinationStore, MemoryCoordinationStore, Versioned};
pub use handler::{SemaphoreHandler, SemaphoreSpec};
