//! Speculative layout computation: the dynamic configuration overlay with
//! trusted/untrusted separation (spec §4.4).

pub mod cache;
pub mod loader;

use uuid::Uuid;

use crate::collaborators::config_loader::ConfigLoader;
use crate::model::{AsyncState, QueueItem};

pub use cache::{ConfigErrorEntry, Layout, LayoutCache};
pub use loader::{run_dynamic_loader, LoaderDecision};

pub enum GetLayoutResult {
    Ready(Uuid),
    NotReady,
    Blocked(Vec<ConfigErrorEntry>),
}

/// `getLayout(item)`, spec §4.4:
/// 1. no ahead-item -> pipeline's static layout
/// 2. item/bundle doesn't touch config -> inherit ahead's layout
/// 3. merge not complete -> not ready
/// 4. otherwise -> invoke the dynamic loader
#[allow(clippy::too_many_arguments)]
pub fn get_layout(
    item: &QueueItem,
    item_ahead: Option<&QueueItem>,
    bundle_updates_config: bool,
    pipeline_static_layout: Uuid,
    loader: &dyn ConfigLoader,
    cache: &mut LayoutCache,
) -> GetLayoutResult {
    let Some(ahead) = item_ahead else {
        return GetLayoutResult::Ready(pipeline_static_layout);
    };

    if !bundle_updates_config {
        return match ahead.layout_uuid {
            Some(uuid) => GetLayoutResult::Ready(uuid),
            None => GetLayoutResult::NotReady,
        };
    }

    if item.build_set.merge_state != AsyncState::Complete {
        return GetLayoutResult::NotReady;
    }

    let project = &item.change.key.project;
    let branch = &item.change.key.branch;
    match run_dynamic_loader(loader, project, branch, &item.build_set.files) {
        Ok(LoaderDecision::UseUntrusted(uuid)) => {
            cache.insert(Layout { uuid, loading_errors: vec![] });
            GetLayoutResult::Ready(uuid)
        }
        Ok(LoaderDecision::UseParentLayout) => match ahead.layout_uuid {
            Some(uuid) => GetLayoutResult::Ready(uuid),
            None => GetLayoutResult::NotReady,
        },
        Ok(LoaderDecision::Blocked(errors)) => GetLayoutResult::Blocked(errors),
        Err(e) => GetLayoutResult::Blocked(vec![ConfigErrorEntry {
            project: project.clone(),
            branch: branch.clone(),
            message: e.to_string(),
        }]),
    }
}
