//! Domain error type for the pipeline manager.
//!
//! Operations whose failure the caller needs to branch on return
//! `Result<T, PipelineError>`. Top-level orchestration (the manager tick,
//! the CLI) instead works in terms of `anyhow::Result` and attaches context,
//! the way the rest of the ambient stack does.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no queue named '{0}' in this pipeline")]
    UnknownQueue(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("dependency cycle detected and not permitted for this project: {0}")]
    CycleNotPermitted(String),

    #[error("lost the pipeline lock for '{0}' mid-tick")]
    LockLost(String),

    #[error("version conflict updating '{path}', retried {attempts} times")]
    VersionConflict { path: String, attempts: u32 },

    #[error("semaphore '{0}' is at capacity")]
    SemaphoreFull(String),

    #[error("missing coordination node: {0}")]
    MissingNode(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("collaborator call failed: {0}")]
    CollaboratorError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
