//! Trait contracts for the systems this crate treats as out-of-scope
//! collaborators (spec §1, §6): code review, merging, execution, node
//! allocation, and configuration loading. The manager core depends on
//! these abstractly and never talks to a concrete implementation.

pub mod config_loader;
pub mod executor;
pub mod merger;
pub mod nodepool;
pub mod source;

pub use config_loader::{ConfigLoader, LoadOutcome};
pub use executor::{Executor, JobCompletion};
pub use merger::{Merger, MergeCompletion};
pub use nodepool::{Nodepool, NodeRequestStatus};
pub use source::SourceConnector;
