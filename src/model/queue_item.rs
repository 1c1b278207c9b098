//! A live position of a `Change` in a pipeline queue, and the per-item
//! lifecycle state machine described in spec §4.1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::build_set::BuildSet;
use super::change::Change;
use crate::error::PipelineError;

/// Coarse lifecycle state of a `QueueItem`. `BuildSet`'s `AsyncState` fields
/// track the finer-grained merge/files/repo-state substates within
/// `MergeReady`/`LayoutReady`; this enum is the outer state machine in
/// spec §4.1's transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    New,
    FilesPending,
    FilesReady,
    MergePending,
    MergeReady,
    LayoutReady,
    JobsReady,
    RepoStateReady,
    NodesRequested,
    Executing,
    Reportable,
    Dequeued,
}

impl ItemState {
    /// Valid forward transitions, per spec §4.1. Any state may transition
    /// directly to `Dequeued` (failure, needed-change-gone, supersede,
    /// cancellation) — that edge is handled separately in
    /// `can_transition_to` rather than listed per-arm.
    pub fn can_transition_to(&self, new_state: ItemState) -> bool {
        if new_state == ItemState::Dequeued {
            return true;
        }
        use ItemState::*;
        matches!(
            (self, new_state),
            (New, FilesPending)
                | (FilesPending, FilesReady)
                | (FilesReady, MergePending)
                | (MergePending, MergeReady)
                | (MergeReady, LayoutReady)
                | (LayoutReady, JobsReady)
                | (JobsReady, RepoStateReady)
                | (RepoStateReady, NodesRequested)
                | (NodesRequested, Executing)
                | (Executing, Reportable)
        )
    }

    pub fn try_transition(&self, new_state: ItemState) -> Result<ItemState, PipelineError> {
        if self.can_transition_to(new_state) {
            Ok(new_state)
        } else {
            Err(PipelineError::InvalidTransition {
                from: format!("{self:?}"),
                to: format!("{new_state:?}"),
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Dequeued)
    }
}

pub type ItemId = uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub change: Change,
    pub queue_name: String,
    /// `true` for directly-enqueued items; `false` for ahead-of-live
    /// ancestors pulled in only to satisfy a `Depends-On:` edge.
    pub live: bool,
    /// Within the queue's active window (see `ChangeQueue::is_actionable`).
    pub active: bool,
    pub item_ahead: Option<ItemId>,
    pub items_behind: Vec<ItemId>,
    pub enqueue_time: DateTime<Utc>,
    pub dequeue_time: Option<DateTime<Utc>>,
    pub bundle_id: Option<uuid::Uuid>,
    pub state: ItemState,
    pub build_set: BuildSet,
    pub layout_uuid: Option<uuid::Uuid>,
    pub reported: bool,
    pub reported_enqueue: bool,
    pub reported_start: bool,
    pub quiet: bool,
}

impl QueueItem {
    pub fn new(change: Change, queue_name: impl Into<String>, live: bool, quiet: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            change,
            queue_name: queue_name.into(),
            live,
            active: true,
            item_ahead: None,
            items_behind: Vec::new(),
            enqueue_time: Utc::now(),
            dequeue_time: None,
            bundle_id: None,
            state: ItemState::New,
            build_set: BuildSet::default(),
            layout_uuid: None,
            reported: false,
            reported_enqueue: false,
            reported_start: false,
            quiet,
        }
    }

    /// Replace the build set, e.g. after `reEnqueueItem` invalidates the
    /// prior speculative layout. Resets the item to `New` unless the job
    /// graph is frozen and being preserved across the move.
    pub fn reset_build_set(&mut self, preserve_job_graph: bool) {
        let job_graph = if preserve_job_graph {
            self.build_set.job_graph.clone()
        } else {
            None
        };
        self.build_set = BuildSet {
            job_graph,
            ..BuildSet::default()
        };
        self.state = if preserve_job_graph { ItemState::JobsReady } else { ItemState::New };
    }
}
