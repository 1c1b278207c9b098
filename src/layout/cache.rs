//! Cache of computed layouts, keyed by uuid (spec §4.4).

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

/// The effective, possibly speculative, pipeline+project configuration
/// visible to a given item.
#[derive(Debug, Clone)]
pub struct Layout {
    pub uuid: Uuid,
    pub loading_errors: Vec<ConfigErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigErrorEntry {
    pub project: String,
    pub branch: String,
    pub message: String,
}

impl ConfigErrorEntry {
    pub fn matches(&self, project: &str, branch: &str) -> bool {
        self.project == project && self.branch == branch
    }
}

#[derive(Default)]
pub struct LayoutCache {
    layouts: HashMap<Uuid, Layout>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, layout: Layout) -> Uuid {
        let uuid = layout.uuid;
        self.layouts.insert(uuid, layout);
        uuid
    }

    pub fn get(&self, uuid: Uuid) -> Option<&Layout> {
        self.layouts.get(&uuid)
    }

    /// Retain only layouts referenced by `live_uuids` — called at tick end
    /// once all items' `layout_uuid`s are known (spec §4.4, §5).
    pub fn maintain_cache(&mut self, live_uuids: &HashSet<Uuid>) {
        self.layouts.retain(|uuid, _| live_uuids.contains(uuid));
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}
