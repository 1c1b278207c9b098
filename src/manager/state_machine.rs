//! `_processOneItem` and `processQueue`: the per-item transition logic of
//! spec §4.1's diagram, NNFI tracking, and cascading cancellation.

use tracing::{debug, info};

use crate::collaborators::executor::JobCompletion;
use crate::collaborators::merger::MergeCompletion;
use crate::collaborators::nodepool::NodeRequestStatus;
use crate::layout::GetLayoutResult;
use crate::model::{AsyncState, ItemId, ItemState, JobResult, NodeRequest};
use crate::semaphore::SemaphoreSpec;

use super::report::{decide, ReportInput};
use super::PipelineManager;

impl<'a> PipelineManager<'a> {
    /// Walk every queue head-to-tail, advancing each item one step. Returns
    /// whether anything changed (the caller re-drives until it settles,
    /// spec §4.1 `processQueue`).
    pub fn process_queue(&mut self) -> bool {
        let queue_names: Vec<String> = self.pipeline.queues.iter().map(|q| q.name.clone()).collect();
        let mut changed = false;

        for queue_name in &queue_names {
            let item_ids: Vec<ItemId> = match self.pipeline.queue_named(queue_name) {
                Some(q) => q.iter_head_to_tail().map(|i| i.id).collect(),
                None => continue,
            };

            let mut nnfi: Option<ItemId> = None;
            for item_id in item_ids {
                if self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)).is_none() {
                    // Dequeued by an earlier step this pass (e.g. cascading
                    // cancellation of items_behind).
                    continue;
                }
                if self.process_one_item(queue_name, item_id, &mut nnfi) {
                    changed = true;
                }
                let is_failing = self
                    .pipeline
                    .queue_named(queue_name)
                    .and_then(|q| q.item(item_id))
                    .map(|i| i.build_set.is_failing())
                    .unwrap_or(true);
                let still_live = self
                    .pipeline
                    .queue_named(queue_name)
                    .and_then(|q| q.item(item_id))
                    .map(|i| i.live)
                    .unwrap_or(false);
                if !is_failing && still_live {
                    nnfi = Some(item_id);
                }
            }

            self.destroy_if_empty_dynamic(queue_name);
        }

        let live_uuids: std::collections::HashSet<uuid::Uuid> = self
            .pipeline
            .queues
            .iter()
            .flat_map(|q| q.items().iter().filter_map(|i| i.layout_uuid))
            .collect();
        self.layout_cache.maintain_cache(&live_uuids);

        changed
    }

    fn destroy_if_empty_dynamic(&mut self, queue_name: &str) {
        let should_remove = self
            .pipeline
            .queue_named(queue_name)
            .map(|q| q.dynamic && q.is_empty())
            .unwrap_or(false);
        if should_remove {
            self.pipeline.queues.retain(|q| q.name != queue_name);
        }
    }

    /// One step of `_processOneItem` (spec §4.1). Returns whether the item
    /// changed state this call.
    fn process_one_item(&mut self, queue_name: &str, item_id: ItemId, nnfi: &mut Option<ItemId>) -> bool {
        if self.check_needed_changes_gone(queue_name, item_id) {
            self.cancel_jobs(queue_name, item_id, true);
            self.dequeue(queue_name, item_id);
            return true;
        }

        self.recompute_active(queue_name, item_id);

        if self.should_reset_behind_nnfi(queue_name, item_id, *nnfi) {
            self.move_behind_nnfi_and_cancel(queue_name, item_id, *nnfi);
            return true;
        }

        let state = match self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)) {
            Some(item) => item.state,
            None => return false,
        };

        let changed = match state {
            ItemState::New => self.start_files(queue_name, item_id),
            ItemState::FilesPending => false,
            ItemState::FilesReady => self.start_merge(queue_name, item_id),
            ItemState::MergePending => false,
            ItemState::MergeReady => self.compute_layout(queue_name, item_id),
            ItemState::LayoutReady => self.freeze_job_graph(queue_name, item_id),
            ItemState::JobsReady => self.start_repo_state(queue_name, item_id),
            ItemState::RepoStateReady => self.request_nodes(queue_name, item_id),
            ItemState::NodesRequested => self.maybe_execute(queue_name, item_id),
            ItemState::Executing => self.maybe_complete(queue_name, item_id),
            ItemState::Reportable => self.maybe_report(queue_name, item_id),
            ItemState::Dequeued => false,
        };
        self.revise_node_priority(queue_name, item_id);
        changed
    }

    /// `_processOneItem`'s relative-priority revision tail (spec §4.1
    /// "Relative priority"): recompute the item's queue-position priority
    /// and revise any outstanding, out-of-date node request in place
    /// instead of leaving it pinned at whatever was issued initially.
    fn revise_node_priority(&mut self, queue_name: &str, item_id: ItemId) {
        let Some(queue) = self.pipeline.queue_named(queue_name) else { return };
        let Some(item) = queue.item(item_id) else { return };
        if !item.live {
            return;
        }
        let priority = queue.index_of(item_id).unwrap_or(0) as i32;
        let stale: Vec<String> = item
            .build_set
            .node_requests
            .iter()
            .filter(|r| !r.fulfilled && r.relative_priority != priority)
            .map(|r| r.request_id.clone())
            .collect();
        if stale.is_empty() {
            return;
        }
        for request_id in &stale {
            if let Err(e) = self.nodepool.revise_request(request_id, priority) {
                self.warn_collaborator_error("revise_request", &e);
            }
        }
        let Some(queue) = self.pipeline.queue_named_mut(queue_name) else { return };
        let Some(item) = queue.item_mut(item_id) else { return };
        for req in item.build_set.node_requests.iter_mut() {
            if stale.contains(&req.request_id) {
                req.relative_priority = priority;
            }
        }
    }

    /// Recompute `item.active` from the queue's current window each pass
    /// (spec §4.2 `isActionable`) — the window only caps speculative depth
    /// if items actually get re-checked against it every tick.
    fn recompute_active(&mut self, queue_name: &str, item_id: ItemId) {
        let Some(queue) = self.pipeline.queue_named(queue_name) else { return };
        let actionable = queue.is_actionable(item_id);
        if let Some(queue) = self.pipeline.queue_named_mut(queue_name) {
            if let Some(item) = queue.item_mut(item_id) {
                item.active = actionable;
            }
        }
    }

    fn check_needed_changes_gone(&self, queue_name: &str, item_id: ItemId) -> bool {
        let Some(item) = self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)) else {
            return false;
        };
        item.change
            .needs_changes
            .iter()
            .any(|needed| !self.pipeline.queues.iter().any(|q| q.items().iter().any(|i| i.change.key == *needed)))
    }

    /// An item not resting behind the nearest-non-failing-item must be
    /// moved back and have its running jobs cancelled non-finally (spec
    /// §4.1 "ordering constraints").
    fn should_reset_behind_nnfi(&self, queue_name: &str, item_id: ItemId, nnfi: Option<ItemId>) -> bool {
        let Some(queue) = self.pipeline.queue_named(queue_name) else { return false };
        let Some(item) = queue.item(item_id) else { return false };
        let Some(ahead) = item.item_ahead else { return false };
        if Some(ahead) != nnfi {
            let ahead_merged = queue.item(ahead).map(|a| a.change.is_merged).unwrap_or(false);
            return !ahead_merged && matches!(item.state, ItemState::Executing | ItemState::NodesRequested);
        }
        false
    }

    fn move_behind_nnfi_and_cancel(&mut self, queue_name: &str, item_id: ItemId, nnfi: Option<ItemId>) {
        self.cancel_jobs(queue_name, item_id, false);
        if let Some(queue) = self.pipeline.queue_named_mut(queue_name) {
            queue.move_item(item_id, nnfi);
        }
    }

    fn dequeue(&mut self, queue_name: &str, item_id: ItemId) {
        if let Some(queue) = self.pipeline.queue_named_mut(queue_name) {
            if let Some(item) = queue.item_mut(item_id) {
                item.state = ItemState::Dequeued;
                item.dequeue_time = Some(chrono::Utc::now());
            }
            queue.dequeue_item(item_id);
        }
    }

    fn start_files(&mut self, queue_name: &str, item_id: ItemId) -> bool {
        let Some(item) = self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)) else { return false };
        let key = item.change.key.clone();
        let ref_name = item.change.ref_name.clone();
        let result = self.merger.get_files_changes(item_id, &key.connection, &key.project, &ref_name, "HEAD");
        let Some(queue) = self.pipeline.queue_named_mut(queue_name) else { return false };
        let Some(item) = queue.item_mut(item_id) else { return false };
        if let Err(e) = result {
            item.build_set.failing_reasons.push(format!("files request failed: {e}"));
        } else {
            item.build_set.files_state = AsyncState::Pending;
            item.state = ItemState::FilesPending;
        }
        true
    }

    fn start_merge(&mut self, queue_name: &str, item_id: ItemId) -> bool {
        let Some(item) = self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)) else { return false };
        let build_set = item.build_set.clone();
        let result = self.merger.merge_changes(item_id, &build_set);
        let Some(queue) = self.pipeline.queue_named_mut(queue_name) else { return false };
        let Some(item) = queue.item_mut(item_id) else { return false };
        if let Err(e) = result {
            item.build_set.failing_reasons.push(format!("merge request failed: {e}"));
        } else {
            item.build_set.merge_state = AsyncState::Pending;
            item.state = ItemState::MergePending;
        }
        true
    }

    fn compute_layout(&mut self, queue_name: &str, item_id: ItemId) -> bool {
        let Some(queue) = self.pipeline.queue_named(queue_name) else { return false };
        let Some(item) = queue.item(item_id) else { return false };
        let ahead = item.item_ahead.and_then(|a| queue.item(a)).cloned();
        let bundle_updates_config = true; // conservative: always re-check, spec leaves the exact predicate to project config
        let static_layout = uuid::Uuid::nil();
        let decision = crate::layout::get_layout(
            item,
            ahead.as_ref(),
            bundle_updates_config,
            static_layout,
            self.config_loader,
            &mut self.layout_cache,
        );

        let Some(queue) = self.pipeline.queue_named_mut(queue_name) else { return false };
        let Some(item) = queue.item_mut(item_id) else { return false };
        match decision {
            GetLayoutResult::Ready(uuid) => {
                item.layout_uuid = Some(uuid);
                item.state = ItemState::LayoutReady;
                true
            }
            GetLayoutResult::NotReady => false,
            GetLayoutResult::Blocked(errors) => {
                item.build_set.config_errors = errors.into_iter().map(|e| e.message).collect();
                item.state = ItemState::Reportable;
                true
            }
        }
    }

    fn freeze_job_graph(&mut self, queue_name: &str, item_id: ItemId) -> bool {
        let Some(item) = self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)) else { return false };
        let Some(layout_uuid) = item.layout_uuid else { return false };
        let key = item.change.key.clone();
        let jobs = self.config_loader.freeze_job_graph(layout_uuid, &key.project, &key.branch);

        let Some(queue) = self.pipeline.queue_named_mut(queue_name) else { return false };
        let Some(item) = queue.item_mut(item_id) else { return false };
        match jobs {
            Ok(jobs) => {
                item.build_set.job_graph = Some(crate::model::JobGraph { jobs: jobs.clone() });
                item.build_set.builds =
                    jobs.into_iter().map(|name| JobResult { job_name: name, voting: true, retryable: false, succeeded: None }).collect();
                item.state = ItemState::JobsReady;
                item.reported_start = false;
                debug!(item = %item_id, "job graph frozen");
            }
            Err(e) => {
                item.build_set.config_errors.push(format!("failed to freeze job graph: {e}"));
                item.state = ItemState::Reportable;
            }
        }
        true
    }

    fn start_repo_state(&mut self, queue_name: &str, item_id: ItemId) -> bool {
        let Some(item) = self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)) else { return false };
        if item.build_set.job_graph.as_ref().map(|g| g.jobs.is_empty()).unwrap_or(true) {
            let Some(queue) = self.pipeline.queue_named_mut(queue_name) else { return false };
            if let Some(item) = queue.item_mut(item_id) {
                item.state = ItemState::Reportable;
            }
            return true;
        }
        let build_set = item.build_set.clone();
        let result = self.merger.get_repo_state(item_id, &build_set);
        let Some(queue) = self.pipeline.queue_named_mut(queue_name) else { return false };
        let Some(item) = queue.item_mut(item_id) else { return false };
        if let Err(e) = result {
            item.build_set.failing_reasons.push(format!("repo state request failed: {e}"));
        } else {
            item.build_set.repo_state_state = AsyncState::Pending;
            item.state = ItemState::RepoStateReady;
        }
        true
    }

    fn request_nodes(&mut self, queue_name: &str, item_id: ItemId) -> bool {
        if self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)).map(|i| i.build_set.repo_state_state)
            != Some(AsyncState::Complete)
        {
            return false;
        }
        let Some(queue) = self.pipeline.queue_named(queue_name) else { return false };
        let Some(item) = queue.item(item_id) else { return false };
        // Outside the active window: hold here rather than speculatively
        // requesting nodes (spec §4.2).
        if !item.active {
            return false;
        }
        let tenant = self.pipeline.tenant.clone();
        let pipeline_name = self.pipeline.name.clone();
        let jobs = item.build_set.job_graph.clone().map(|g| g.jobs).unwrap_or_default();
        let priority = queue.index_of(item_id).unwrap_or(0) as i32;

        let mut requests = Vec::new();
        for job_name in &jobs {
            match self.nodepool.request_nodes(item_id, job_name, &tenant, &pipeline_name, None, 0, priority) {
                Ok(request_id) => {
                    requests.push(NodeRequest { job_name: job_name.clone(), request_id, fulfilled: false, relative_priority: priority })
                }
                Err(e) => self.warn_collaborator_error("request_nodes", &e),
            }
        }

        let Some(queue) = self.pipeline.queue_named_mut(queue_name) else { return false };
        let Some(item) = queue.item_mut(item_id) else { return false };
        item.build_set.node_requests = requests;
        item.state = ItemState::NodesRequested;
        true
    }

    fn maybe_execute(&mut self, queue_name: &str, item_id: ItemId) -> bool {
        let Some(queue) = self.pipeline.queue_named(queue_name) else { return false };
        let Some(item) = queue.item(item_id) else { return false };
        if item.build_set.node_requests.is_empty() || !item.build_set.node_requests.iter().all(|r| r.fulfilled) {
            return false;
        }
        let ancestor_ok = item
            .item_ahead
            .and_then(|a| queue.item(a))
            .map(|a| !a.build_set.is_failing())
            .unwrap_or(true);
        if !ancestor_ok {
            return false;
        }

        let jobs = item.build_set.job_graph.clone().map(|g| g.jobs).unwrap_or_default();
        let pipeline_name = self.pipeline.name.clone();
        for job_name in &jobs {
            let semaphore_spec: Option<SemaphoreSpec> = None; // resolved from layout in a full config-loader integration
            match self.semaphore.acquire(item_id, job_name, semaphore_spec.as_ref(), false) {
                Ok(true) => {
                    if let Err(e) = self.executor.execute(job_name, &[], item_id, &pipeline_name, None, &[], &[]) {
                        self.warn_collaborator_error("execute", &e);
                    }
                }
                Ok(false) => return false,
                Err(e) => info!(error = %e, "semaphore acquisition failed"),
            }
        }

        let Some(queue) = self.pipeline.queue_named_mut(queue_name) else { return false };
        let Some(item) = queue.item_mut(item_id) else { return false };
        item.state = ItemState::Executing;
        if !item.reported_start {
            item.reported_start = true;
        }
        true
    }

    fn maybe_complete(&mut self, queue_name: &str, item_id: ItemId) -> bool {
        let Some(queue) = self.pipeline.queue_named_mut(queue_name) else { return false };
        let Some(item) = queue.item_mut(item_id) else { return false };
        if !item.build_set.all_jobs_complete() {
            return false;
        }
        if item.build_set.fail_fast && item.build_set.builds.iter().any(|b| b.voting && !b.retryable && b.succeeded == Some(false)) {
            // fail-fast: stop waiting on the rest, treat as complete now.
        }
        item.state = ItemState::Reportable;
        true
    }

    /// `item.isBundleFailing()`: true once any member is known to be
    /// failing — either a still-queued sibling whose `BuildSet` is failing,
    /// or a dequeued sibling whose final outcome was recorded as a failure
    /// (spec §3, §4.1).
    fn bundle_is_failing(&self, bundle_id: uuid::Uuid, queue_name: &str) -> bool {
        let Some(bundle) = self.bundles.get(&bundle_id) else { return false };
        if bundle.any_reported_failure() {
            return true;
        }
        bundle.items.iter().any(|id| {
            self.pipeline
                .queue_named(queue_name)
                .and_then(|q| q.item(*id))
                .map(|i| i.build_set.is_failing())
                .unwrap_or(false)
        })
    }

    /// `item.didBundleFinish()`: every member has either already recorded
    /// its outcome or is itself ready to report (spec §3, §4.1).
    fn bundle_did_finish(&self, bundle_id: uuid::Uuid) -> bool {
        let Some(bundle) = self.bundles.get(&bundle_id) else { return true };
        bundle.items.iter().all(|id| {
            if bundle.reported.contains_key(id) {
                return true;
            }
            self.pipeline
                .queues
                .iter()
                .find_map(|q| q.item(*id))
                .map(|i| matches!(i.state, ItemState::Reportable) || i.build_set.all_jobs_complete())
                .unwrap_or(false)
        })
    }

    fn maybe_report(&mut self, queue_name: &str, item_id: ItemId) -> bool {
        let (item_ahead, bundle_id) = match self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)) {
            Some(item) => (item.item_ahead, item.bundle_id),
            None => return false,
        };
        if item_ahead.is_some() {
            return false;
        }

        // Bundle members only report once the bundle either finished
        // cleanly or is already known to be failing (spec §3 "the bundle
        // either merges atomically or fails"); `cannot_merge` is left
        // permanently unset, matching upstream's own always-permissive
        // mergeability check.
        if let Some(bundle_id) = bundle_id {
            let failing = self.bundle_is_failing(bundle_id, queue_name);
            let finished = self.bundle_did_finish(bundle_id);
            if !(failing || finished) {
                return false;
            }
            if let Some(bundle) = self.bundles.get_mut(&bundle_id) {
                bundle.started_reporting = true;
                if failing {
                    bundle.failed_reporting = true;
                }
            }
        }

        let Some(item) = self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)) else { return false };
        let input = ReportInput {
            project_in_pipeline: true,
            config_errors: item.build_set.config_errors.clone(),
            merger_failed: item.build_set.unable_to_merge,
            dequeued_needing_change: item.build_set.failing_reasons.iter().any(|r| r.contains("needed change")),
            has_jobs: item.build_set.job_graph.as_ref().map(|g| !g.jobs.is_empty()).unwrap_or(false),
            cannot_merge_bundle: bundle_id.and_then(|id| self.bundles.get(&id)).map(|b| b.cannot_merge).unwrap_or(false),
            bundle_failing: bundle_id.and_then(|id| self.bundles.get(&id)).map(|b| b.failed_reporting).unwrap_or(false),
            all_jobs_succeeded: item.build_set.all_jobs_succeeded(),
        };

        let outcome = decide(&mut self.pipeline, &input);
        info!(item = %item_id, result = ?outcome.result, actions = ?outcome.actions, "item reported");

        if let Some(queue) = self.pipeline.queue_named_mut(queue_name) {
            match outcome.result {
                super::report::ReportResult::Success => queue.increase_window(),
                super::report::ReportResult::Failure | super::report::ReportResult::MergerFailure => queue.decrease_window(),
                super::report::ReportResult::NoJobs | super::report::ReportResult::ConfigError => {}
            }
        }

        if let Some(bundle_id) = bundle_id {
            let success = matches!(outcome.result, super::report::ReportResult::Success);
            if let Some(bundle) = self.bundles.get_mut(&bundle_id) {
                bundle.reported.insert(item_id, success);
                if !success {
                    bundle.failed_reporting = true;
                }
            }
        }

        self.dequeue(queue_name, item_id);
        if let Some(queue) = self.pipeline.queue_named_mut(queue_name) {
            if let Some(item) = queue.item_mut(item_id) {
                item.reported = true;
            }
        }
        true
    }

    /// `cancelJobs(item, prime)`, spec §5 "Cancellation": cancel running
    /// jobs and, when `prime`, reset the build set entirely; cascades to
    /// `items_behind` with the same `prime` flag.
    pub fn cancel_jobs(&mut self, queue_name: &str, item_id: ItemId, prime: bool) {
        let bundle_reporting = self
            .pipeline
            .queue_named(queue_name)
            .and_then(|q| q.item(item_id))
            .and_then(|i| i.bundle_id)
            .and_then(|id| self.bundles.get(&id))
            .map(|b| b.started_reporting)
            .unwrap_or(false);

        let behind: Vec<ItemId> =
            self.pipeline.queue_named(queue_name).and_then(|q| q.item(item_id)).map(|i| i.items_behind.clone()).unwrap_or_default();

        if !bundle_reporting {
            if let Some(queue) = self.pipeline.queue_named_mut(queue_name) {
                if let Some(item) = queue.item_mut(item_id) {
                    for job in item.build_set.job_graph.clone().map(|g| g.jobs).unwrap_or_default() {
                        let _ = self.executor.resume_build(item_id, &job);
                        let _ = self.semaphore.release_named("pool", item_id, &job);
                    }
                }
            }
            if prime {
                if let Some(queue) = self.pipeline.queue_named_mut(queue_name) {
                    if let Some(item) = queue.item_mut(item_id) {
                        item.reset_build_set(false);
                        item.build_set.failing_reasons.push("cancelled".to_string());
                    }
                }
            }
        }

        for behind_id in behind {
            self.cancel_jobs(queue_name, behind_id, prime);
        }
    }

    pub fn on_merge_complete(&mut self, item_id: ItemId, completion: MergeCompletion) {
        for queue in &mut self.pipeline.queues {
            if let Some(item) = queue.item_mut(item_id) {
                if item.build_set.files_state == AsyncState::Pending {
                    item.build_set.files = completion.files.clone();
                    item.build_set.files_state = AsyncState::Complete;
                    item.state = ItemState::FilesReady;
                }
                if item.build_set.merge_state == AsyncState::Pending {
                    item.build_set.commit = completion.commit.clone();
                    item.build_set.unable_to_merge = !completion.merged;
                    item.build_set.repo_state = completion.repo_state.clone();
                    item.build_set.merge_state = AsyncState::Complete;
                    item.state = if completion.merged { ItemState::MergeReady } else { ItemState::Reportable };
                }
                if item.build_set.repo_state_state == AsyncState::Pending {
                    item.build_set.repo_state = completion.repo_state.clone();
                    item.build_set.repo_state_state = AsyncState::Complete;
                    // Stays in RepoStateReady; `request_nodes` (triggered by
                    // the next `process_queue` pass) issues the node
                    // requests and advances to NodesRequested.
                }
                return;
            }
        }
    }

    pub fn on_build_complete(&mut self, item_id: ItemId, completion: JobCompletion) {
        for queue in &mut self.pipeline.queues {
            if let Some(item) = queue.item_mut(item_id) {
                if let Some(build) = item.build_set.builds.iter_mut().find(|b| b.job_name == completion.job_name) {
                    build.succeeded = Some(completion.succeeded);
                    build.retryable = completion.retryable;
                }
                if item.build_set.fail_fast && !completion.succeeded && !completion.retryable {
                    item.build_set.failing_reasons.push(format!("{} failed (fail-fast)", completion.job_name));
                }
                return;
            }
        }
    }

    pub fn on_node_request_complete(&mut self, item_id: ItemId, request_id: &str, status: NodeRequestStatus) {
        for queue in &mut self.pipeline.queues {
            if let Some(item) = queue.item_mut(item_id) {
                if let Some(req) = item.build_set.node_requests.iter_mut().find(|r| r.request_id == request_id) {
                    req.fulfilled = status.fulfilled;
                }
                return;
            }
        }
    }
}
