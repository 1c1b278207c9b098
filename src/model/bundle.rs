//! A set of `QueueItem`s whose `Change`s form a dependency cycle. Bundle
//! members share success/failure: the bundle either merges atomically or
//! fails as a whole (spec §3, §4.1, §4.3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::queue_item::ItemId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub id: uuid::Uuid,
    pub items: Vec<ItemId>,
    pub started_reporting: bool,
    pub failed_reporting: bool,
    /// Stays unset: the reference implementation's own `canMergeCycle` is
    /// a permanently-`True` stub, so there is no real mergeability check to
    /// port (spec §3, §4.3).
    pub cannot_merge: bool,
    /// Each member's final success/failure, recorded as it is dequeued —
    /// `ChangeQueue::dequeue_item` removes the live `QueueItem`, so this is
    /// the only place a sibling can later check "did the bundle finish
    /// clean" after some members are gone (spec §3, §4.1).
    pub reported: HashMap<ItemId, bool>,
}

impl Bundle {
    pub fn new(items: Vec<ItemId>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            items,
            started_reporting: false,
            failed_reporting: false,
            cannot_merge: false,
            reported: HashMap::new(),
        }
    }

    pub fn extend(&mut self, item: ItemId) {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
    }

    /// True once every member has either reported success or the bundle is
    /// already known to be failing.
    pub fn all_reported(&self) -> bool {
        self.items.iter().all(|id| self.reported.contains_key(id))
    }

    /// True iff any member that has reported so far reported failure.
    pub fn any_reported_failure(&self) -> bool {
        self.reported.values().any(|success| !success)
    }
}
