//! The pipeline aggregate: queues, action sets, and the persistent state
//! (`disabled`, `consecutive_failures`) that `ReportDecision` maintains.

use serde::{Deserialize, Serialize};

use crate::queue::change_queue::ChangeQueue;

/// One named report action, e.g. `"gerrit-vote"` or `"sql-reporter"`. The
/// manager core only needs to know the action *set* selected for a given
/// terminal state (spec §4.6); dispatching the actions themselves is a
/// collaborator concern (out of scope, §1).
pub type ActionName = String;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionSets {
    pub enqueue_actions: Vec<ActionName>,
    pub start_actions: Vec<ActionName>,
    pub success_actions: Vec<ActionName>,
    pub failure_actions: Vec<ActionName>,
    pub merge_failure_actions: Vec<ActionName>,
    pub no_jobs_actions: Vec<ActionName>,
    pub dequeue_actions: Vec<ActionName>,
    pub disabled_actions: Vec<ActionName>,
}

/// Persistent, cross-tick pipeline state. Lives in the coordination store at
/// `/zuul/pipelines/<tenant>/<pipeline>` (spec §6); here it is carried as a
/// plain struct the coordination layer versions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub disabled: bool,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub tenant: String,
    pub queues: Vec<ChangeQueue>,
    pub precedence: i64,
    pub actions: ActionSets,
    /// Other pipelines this one supersedes: an item landing here is
    /// dequeued from those pipelines (spec §4.1 `addChange`).
    pub supercedes: Vec<String>,
    /// `consecutive_failures >= disable_at` flips `state.disabled` (spec
    /// §4.6). `None` means the pipeline never auto-disables.
    pub disable_at: Option<u32>,
    pub state: PipelineState,
    pub allow_circular_dependencies: bool,
    pub dequeue_on_new_patchset: bool,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tenant: tenant.into(),
            queues: Vec::new(),
            precedence: 0,
            actions: ActionSets::default(),
            supercedes: Vec::new(),
            disable_at: None,
            state: PipelineState::default(),
            allow_circular_dependencies: false,
            dequeue_on_new_patchset: false,
        }
    }

    pub fn queue_named_mut(&mut self, name: &str) -> Option<&mut ChangeQueue> {
        self.queues.iter_mut().find(|q| q.name == name)
    }

    pub fn queue_named(&self, name: &str) -> Option<&ChangeQueue> {
        self.queues.iter().find(|q| q.name == name)
    }

    /// Record a failure report: bump `consecutive_failures`, and flip
    /// `disabled` once the configured threshold is reached (spec §4.6
    /// "Override").
    pub fn record_failure(&mut self) {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        if let Some(threshold) = self.disable_at {
            if self.state.consecutive_failures >= threshold {
                self.state.disabled = true;
            }
        }
    }

    pub fn record_success(&mut self) {
        self.state.consecutive_failures = 0;
    }
}
