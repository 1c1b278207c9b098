//! Merger worker contract (spec §6). Merge, repo-state, and file-diff
//! requests are fire-and-forget: completion arrives later as a
//! `manager::event::Event::MergeComplete` on some subsequent tick (spec
//! §5 "Suspension points").

use crate::model::{BuildSet, ItemId};

/// What a completed merge/repo-state/files request reported back.
#[derive(Debug, Clone, Default)]
pub struct MergeCompletion {
    pub merged: bool,
    pub updated: bool,
    pub commit: Option<String>,
    pub files: Vec<String>,
    pub repo_state: std::collections::HashMap<String, String>,
    /// Per spec §6: which branches the item's commit already lands in,
    /// used to short-circuit already-merged ancestors.
    pub item_in_branches: Vec<String>,
}

pub trait Merger {
    fn merge_changes(&self, item_id: ItemId, build_set: &BuildSet) -> anyhow::Result<()>;

    fn get_repo_state(&self, item_id: ItemId, build_set: &BuildSet) -> anyhow::Result<()>;

    fn get_files_changes(
        &self,
        item_id: ItemId,
        connection: &str,
        project: &str,
        ref_name: &str,
        to_sha: &str,
    ) -> anyhow::Result<()>;
}
