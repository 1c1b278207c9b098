//! Ordered sequence of `QueueItem`s with windowing, bundle membership, and
//! supersedence (spec §3 `ChangeQueue`, §4.2).

use serde::{Deserialize, Serialize};

use crate::model::{ChangeKey, ItemId, QueueItem};

/// `ChangeQueue::enqueue_change` outcome useful to the caller without
/// re-walking the queue.
pub struct Enqueued {
    pub item_id: ItemId,
    pub item_ahead: Option<ItemId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeQueue {
    pub name: String,
    /// Precomputed from configuration (`static`) or created on first
    /// enqueue and destroyed when empty (`dynamic`) — spec §3.
    pub dynamic: bool,
    pub allow_circular_dependencies: bool,
    /// Sliding cap on actionable items (spec §4.2 `isActionable`).
    pub window: usize,
    pub window_floor: usize,
    pub window_increase_factor: usize,
    pub window_decrease_factor: f64,
    items: Vec<QueueItem>,
}

impl ChangeQueue {
    pub fn new_static(name: impl Into<String>, window: usize) -> Self {
        Self {
            name: name.into(),
            dynamic: false,
            allow_circular_dependencies: false,
            window: window.max(1),
            window_floor: 1,
            window_increase_factor: 1,
            window_decrease_factor: 0.5,
            items: Vec::new(),
        }
    }

    pub fn new_dynamic(name: impl Into<String>, window: usize) -> Self {
        Self {
            dynamic: true,
            ..Self::new_static(name, window)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn item(&self, id: ItemId) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn index_of(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|i| i.id == id)
    }

    /// True iff a `live` item for this change is already present — the
    /// no-op-success path of `addChange` (spec §4.1, invariant §8.1).
    pub fn has_live_change(&self, key: &ChangeKey) -> bool {
        self.items.iter().any(|i| i.live && i.change.key == *key)
    }

    /// Append a new item at the tail, linking it behind the current last
    /// item (or at the head if the queue was empty).
    pub fn enqueue_change(&mut self, mut item: QueueItem) -> Enqueued {
        let ahead = self.items.last().map(|i| i.id);
        item.item_ahead = ahead;
        let id = item.id;
        if let Some(ahead_id) = ahead {
            if let Some(ahead_item) = self.item_mut(ahead_id) {
                ahead_item.items_behind.push(id);
            }
        }
        self.items.push(item);
        Enqueued { item_id: id, item_ahead: ahead }
    }

    /// Relocate `item` to sit directly behind `target_ahead` (`None` means
    /// the head of the queue). Used by `reEnqueueItem` after a layout
    /// invalidation or NNFI-driven reshuffle (spec §4.1).
    pub fn move_item(&mut self, item_id: ItemId, target_ahead: Option<ItemId>) {
        let Some(pos) = self.index_of(item_id) else { return };
        let item = self.items.remove(pos);
        self.unlink(&item);

        let insert_at = match target_ahead {
            None => 0,
            Some(ahead_id) => match self.index_of(ahead_id) {
                Some(i) => i + 1,
                None => self.items.len(),
            },
        };
        let mut item = item;
        item.item_ahead = target_ahead;
        let id = item.id;
        self.items.insert(insert_at.min(self.items.len()), item);
        self.relink_neighbors(id);
    }

    /// Unlink `item` from the queue without altering anyone else's order;
    /// used by `move_item` before it is reinserted elsewhere.
    fn unlink(&mut self, item: &QueueItem) {
        if let Some(ahead_id) = item.item_ahead {
            if let Some(ahead_item) = self.item_mut(ahead_id) {
                ahead_item.items_behind.retain(|b| *b != item.id);
            }
        }
        for behind_id in item.items_behind.clone() {
            if let Some(behind_item) = self.item_mut(behind_id) {
                behind_item.item_ahead = item.item_ahead;
            }
        }
    }

    fn relink_neighbors(&mut self, id: ItemId) {
        let pos = self.index_of(id).expect("just inserted");
        let ahead = if pos > 0 { Some(self.items[pos - 1].id) } else { None };
        let behind = self.items.get(pos + 1).map(|i| i.id);
        if let Some(ahead_id) = ahead {
            if let Some(ahead_item) = self.item_mut(ahead_id) {
                if !ahead_item.items_behind.contains(&id) {
                    ahead_item.items_behind.push(id);
                }
            }
        }
        if let Some(behind_id) = behind {
            if let Some(behind_item) = self.item_mut(behind_id) {
                behind_item.item_ahead = Some(id);
            }
        }
    }

    /// Unlink and remove `item_id`. Returns true if the queue is now empty
    /// (the caller, `Pipeline`, destroys dynamic queues in that case).
    pub fn dequeue_item(&mut self, item_id: ItemId) -> bool {
        if let Some(pos) = self.index_of(item_id) {
            let item = self.items[pos].clone();
            self.unlink(&item);
            self.items.remove(pos);
        }
        self.dynamic && self.items.is_empty()
    }

    /// Within the active window iff the item's position (0-based, head
    /// first) is less than `window` (spec §4.2).
    pub fn is_actionable(&self, item_id: ItemId) -> bool {
        match self.index_of(item_id) {
            Some(pos) => pos < self.window,
            None => false,
        }
    }

    /// Additive increase on success, never below the floor.
    pub fn increase_window(&mut self) {
        self.window = self.window.saturating_add(self.window_increase_factor);
    }

    /// Multiplicative decrease on merge failure, clamped to
    /// `window_floor` (spec §4.2, §8 "Window shrinks to 1 ... never below
    /// 1" when `window_floor == 1`).
    pub fn decrease_window(&mut self) {
        let shrunk = ((self.window as f64) * self.window_decrease_factor).floor() as usize;
        self.window = shrunk.max(self.window_floor);
    }

    /// Iterate items head-to-tail, the order `_processOneItem` relies on
    /// for NNFI tracking (spec §4.1, §5).
    pub fn iter_head_to_tail(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }
}
