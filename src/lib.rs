//! Pipeline manager core for a gating CI/CD scheduler: change admission,
//! the per-item lifecycle state machine, distributed concurrency
//! coordination, speculative layout computation, and reporting decisions.

pub mod collaborators;
pub mod config;
pub mod dependency;
pub mod error;
pub mod layout;
pub mod logging;
pub mod manager;
pub mod model;
pub mod queue;
pub mod semaphore;

pub use error::{PipelineError, Result};
pub use manager::{Event, PipelineManager};
