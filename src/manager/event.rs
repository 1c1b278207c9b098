//! The inbound event vocabulary driving the manager (spec §2 "Data flow",
//! §4.1). One event is delivered per call; the manager reacts and returns.

use crate::collaborators::executor::JobCompletion;
use crate::collaborators::merger::MergeCompletion;
use crate::collaborators::nodepool::NodeRequestStatus;
use crate::model::{Change, ChangeKey, ItemId};

#[derive(Debug, Clone)]
pub enum Event {
    ChangeProposed {
        change: Change,
        queue_name: String,
        live: bool,
        quiet: bool,
        ignore_requirements: bool,
    },
    ChangeUpdated { change: Change },
    ChangeAbandoned { change: Change },
    MergeComplete { item_id: ItemId, completion: MergeCompletion },
    BuildComplete { item_id: ItemId, completion: JobCompletion },
    NodeRequestComplete { item_id: ItemId, request_id: String, status: NodeRequestStatus },
}

/// Raised when an admitted live change should dequeue a matching item from
/// another pipeline named in `Pipeline.supercedes` (spec §4.1
/// `dequeueSupercededItems`). The original hands an equivalent
/// `DequeueEvent` to its scheduler rather than mutating the other pipeline
/// synchronously; this manager owns a single pipeline, so it surfaces the
/// request for whatever embeds several managers to drain.
#[derive(Debug, Clone)]
pub struct SupersedeRequest {
    pub pipeline_name: String,
    pub change: ChangeKey,
}
