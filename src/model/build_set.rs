//! The per-item execution context: merge state, job graph, builds, and the
//! substates that drive `_processOneItem` (see `manager::state_machine`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shared by `merge_state`, `files_state`, and `repo_state_state` — all
/// three track the same asynchronous request/response shape toward a
/// collaborator (merger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncState {
    New,
    Pending,
    Complete,
}

impl AsyncState {
    /// Valid transitions: `New -> Pending -> Complete`. Re-entering `New`
    /// from `Complete` happens on `BuildSet` replacement, not in place.
    pub fn can_transition_to(&self, new_state: AsyncState) -> bool {
        use AsyncState::*;
        matches!(
            (self, new_state),
            (New, New) | (Pending, Pending) | (Complete, Complete) | (New, Pending) | (Pending, Complete)
        )
    }

    pub fn try_transition(&self, new_state: AsyncState) -> Result<AsyncState, crate::error::PipelineError> {
        if self.can_transition_to(new_state) {
            Ok(new_state)
        } else {
            Err(crate::error::PipelineError::InvalidTransition {
                from: format!("{self:?}"),
                to: format!("{new_state:?}"),
            })
        }
    }
}

/// A single job within the item's job graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_name: String,
    pub voting: bool,
    pub retryable: bool,
    pub succeeded: Option<bool>,
}

/// A pending or fulfilled node allocation request for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRequest {
    pub job_name: String,
    pub request_id: String,
    pub fulfilled: bool,
    /// The item's relative priority in its queue at the time this request
    /// was last issued or revised (spec §4.1 "Relative priority").
    pub relative_priority: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobGraph {
    pub jobs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSet {
    pub merge_state: AsyncState,
    pub files_state: AsyncState,
    pub repo_state_state: AsyncState,
    pub files: Vec<String>,
    pub repo_state: HashMap<String, String>,
    pub commit: Option<String>,
    pub job_graph: Option<JobGraph>,
    pub builds: Vec<JobResult>,
    pub node_requests: Vec<NodeRequest>,
    pub config_errors: Vec<String>,
    pub unable_to_merge: bool,
    pub fail_fast: bool,
    pub failing_reasons: Vec<String>,
}

impl Default for BuildSet {
    fn default() -> Self {
        Self {
            merge_state: AsyncState::New,
            files_state: AsyncState::New,
            repo_state_state: AsyncState::New,
            files: Vec::new(),
            repo_state: HashMap::new(),
            commit: None,
            job_graph: None,
            builds: Vec::new(),
            node_requests: Vec::new(),
            config_errors: Vec::new(),
            unable_to_merge: false,
            fail_fast: false,
            failing_reasons: Vec::new(),
        }
    }
}

impl BuildSet {
    /// `merge_state == COMPLETE => commit != None || unable_to_merge`
    /// (§3 invariant). Checked in debug builds at the points that set
    /// `merge_state` to `Complete`; see `manager::state_machine`.
    pub fn merge_complete_invariant_holds(&self) -> bool {
        self.merge_state != AsyncState::Complete || self.commit.is_some() || self.unable_to_merge
    }

    pub fn all_jobs_complete(&self) -> bool {
        self.job_graph.is_some()
            && !self.builds.is_empty()
            && self.builds.len() >= self.job_graph.as_ref().unwrap().jobs.len()
            && self.builds.iter().all(|b| b.succeeded.is_some())
    }

    pub fn all_jobs_succeeded(&self) -> bool {
        self.all_jobs_complete() && self.builds.iter().all(|b| b.succeeded == Some(true))
    }

    pub fn is_failing(&self) -> bool {
        !self.failing_reasons.is_empty() || self.unable_to_merge || !self.config_errors.is_empty()
    }
}
