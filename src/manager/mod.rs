//! `PipelineManager`: owns queues, drives the per-item state machine, and
//! orchestrates the collaborators (spec §2, §4.1).

pub mod admit;
pub mod event;
pub mod report;
pub mod state_machine;

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::collaborators::executor::Executor;
use crate::collaborators::merger::Merger;
use crate::collaborators::nodepool::Nodepool;
use crate::collaborators::source::SourceConnector;
use crate::collaborators::ConfigLoader;
use crate::dependency::DependencyResolver;
use crate::layout::LayoutCache;
use crate::model::{Bundle, Pipeline};
use crate::semaphore::SemaphoreHandler;

pub use event::{Event, SupersedeRequest};

/// Everything the manager needs to drive one pipeline's tick. Borrows the
/// collaborators for the duration of the call — there is no persistent
/// ownership of external services (spec §5: all I/O is issued and
/// completed via events, never held open across ticks).
pub struct PipelineManager<'a> {
    pub pipeline: Pipeline,
    pub resolver: DependencyResolver,
    pub layout_cache: LayoutCache,
    pub semaphore: SemaphoreHandler<'a>,
    pub bundles: HashMap<Uuid, Bundle>,
    /// Pending `dequeueSupercededItems` requests, one per admitted live
    /// change per superceded pipeline name, for the embedding scheduler to
    /// drain against its other `PipelineManager`s (spec §4.1).
    pub supersede_requests: Vec<SupersedeRequest>,
    pub sources: Vec<&'a dyn SourceConnector>,
    pub config_loader: &'a dyn ConfigLoader,
    pub merger: &'a dyn Merger,
    pub executor: &'a dyn Executor,
    pub nodepool: &'a dyn Nodepool,
}

impl<'a> PipelineManager<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: Pipeline,
        semaphore: SemaphoreHandler<'a>,
        sources: Vec<&'a dyn SourceConnector>,
        config_loader: &'a dyn ConfigLoader,
        merger: &'a dyn Merger,
        executor: &'a dyn Executor,
        nodepool: &'a dyn Nodepool,
    ) -> Self {
        Self {
            pipeline,
            resolver: DependencyResolver::new(),
            layout_cache: LayoutCache::new(),
            semaphore,
            bundles: HashMap::new(),
            supersede_requests: Vec::new(),
            sources,
            config_loader,
            merger,
            executor,
            nodepool,
        }
    }

    pub fn source_for(&self, hostname: &str) -> Option<&dyn SourceConnector> {
        self.sources.iter().find(|s| s.hostname() == hostname).copied()
    }

    /// Single entry point: react to one inbound event, then drive the
    /// state machine until nothing more changes this tick (spec §2 "Data
    /// flow", §5 "Suspension points").
    pub fn handle_event(&mut self, event: Event) -> bool {
        let admitted = match event {
            Event::ChangeProposed { change, queue_name, live, quiet, ignore_requirements } => {
                self.add_change(change, &queue_name, live, quiet, ignore_requirements)
            }
            Event::ChangeUpdated { change } => {
                let queue_name = self.remove_old_versions_of_change(&change);
                let queue_name = queue_name.unwrap_or_else(|| "gate".to_string());
                self.add_change(change, &queue_name, true, false, false)
            }
            Event::ChangeAbandoned { change } => {
                self.remove_abandoned_change(&change);
                true
            }
            Event::MergeComplete { item_id, completion } => {
                self.on_merge_complete(item_id, completion);
                true
            }
            Event::BuildComplete { item_id, completion } => {
                self.on_build_complete(item_id, completion);
                true
            }
            Event::NodeRequestComplete { item_id, request_id, status } => {
                self.on_node_request_complete(item_id, &request_id, status);
                true
            }
        };

        let mut changed = admitted;
        loop {
            if !self.process_queue() {
                break;
            }
            changed = true;
        }
        changed
    }

    pub(crate) fn warn_collaborator_error(&self, context: &str, err: &anyhow::Error) {
        warn!(context, error = %err, "collaborator call failed, item marked and queue processing continues");
    }
}
