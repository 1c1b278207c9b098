//! A proposed revision under review, and its stable identity.

use serde::{Deserialize, Serialize};

/// Identifies a single revision of a review: `(connection, project, branch,
/// change-id, patchset)`. Two revisions of the same review share
/// `connection`/`project`/`branch`/`change_id` but differ in `patchset` —
/// they are "same-change" (see [`ChangeKey::is_same_change`]) but not equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeKey {
    pub connection: String,
    pub project: String,
    pub branch: String,
    pub change_id: String,
    pub patchset: u32,
}

impl ChangeKey {
    pub fn is_same_change(&self, other: &ChangeKey) -> bool {
        self.connection == other.connection
            && self.project == other.project
            && self.branch == other.branch
            && self.change_id == other.change_id
    }

    /// True when `other` is a strictly newer patchset of the same change.
    pub fn is_newer_patchset_of(&self, other: &ChangeKey) -> bool {
        self.is_same_change(other) && self.patchset > other.patchset
    }
}

impl std::fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{},{}@{}",
            self.connection, self.project, self.branch, self.change_id, self.patchset
        )
    }
}

/// A proposed revision under review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub key: ChangeKey,
    pub ref_name: String,
    pub message: String,
    /// Declared dependencies, resolved from `Depends-On:` headers in
    /// `message` plus anything set explicitly via `commit_needs_changes`.
    pub needs_changes: Vec<ChangeKey>,
    /// Reverse edges: changes that declared a dependency on this one.
    pub needed_by_changes: Vec<ChangeKey>,
    pub is_merged: bool,
}

impl Change {
    pub fn new(key: ChangeKey, ref_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key,
            ref_name: ref_name.into(),
            message: message.into(),
            needs_changes: Vec::new(),
            needed_by_changes: Vec::new(),
            is_merged: false,
        }
    }
}

impl PartialEq for Change {
    /// Changes are content-addressed: equality is by key only. Two
    /// `Change` values with the same key are the *same revision*, even if
    /// one has a staler `needs_changes` list.
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for Change {}
