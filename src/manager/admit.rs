//! Change admission and queue maintenance: `addChange`,
//! `removeOldVersionsOfChange`, `removeAbandonedChange`, `reEnqueueItem`,
//! and cycle-aware `enqueueChangesAhead` (spec §4.1, §4.3).

use tracing::{debug, info};

use crate::model::{Bundle, Change, ChangeKey, ItemState, QueueItem};
use crate::queue::change_queue::ChangeQueue;

use super::event::SupersedeRequest;
use super::PipelineManager;

impl<'a> PipelineManager<'a> {
    fn get_or_create_queue(&mut self, name: &str) -> &mut ChangeQueue {
        if self.pipeline.queue_named(name).is_none() {
            self.pipeline.queues.push(ChangeQueue::new_dynamic(name, 8));
        }
        self.pipeline.queue_named_mut(name).expect("just inserted")
    }

    /// `addChange`, spec §4.1.
    pub fn add_change(
        &mut self,
        change: Change,
        queue_name: &str,
        live: bool,
        quiet: bool,
        ignore_requirements: bool,
    ) -> bool {
        if live {
            if let Some(queue) = self.pipeline.queue_named(queue_name) {
                if queue.has_live_change(&change.key) {
                    return true;
                }
            }
        }

        if !ignore_requirements && !self.passes_ref_filters(&change) {
            info!(change = %change.key, "change rejected by ref filters");
            return false;
        }

        let needed = match self.resolve_commit_dependencies(&change) {
            Ok(needed) => needed,
            Err(err) => {
                self.warn_collaborator_error("resolve_commit_dependencies", &err);
                Vec::new()
            }
        };

        self.resolver.record_edge(change.key.clone(), needed.iter().map(|c| c.key.clone()).collect());

        let cycle = self.resolver.cycle_containing(&change.key);
        if let Some(cycle) = &cycle {
            if !self.pipeline.allow_circular_dependencies {
                self.enqueue_cycle_failure(change, queue_name, cycle.clone(), quiet);
                return false;
            }
        }

        match self.enqueue_changes_ahead(&needed, queue_name, quiet) {
            Ok(ahead_ids) => {
                let item = QueueItem::new(change.clone(), queue_name, live, quiet);
                let item_id = item.id;
                let enqueued = self.get_or_create_queue(queue_name).enqueue_change(item);
                debug!(item = %enqueued.item_id, "enqueued change");

                if let Some(cycle) = &cycle {
                    self.form_or_extend_bundle(item_id, &ahead_ids, cycle);
                }

                // Defer enqueueChangesBehind until every cycle member has
                // been admitted; for a non-cyclic change there's just the
                // one (spec §4.1, §9).
                let behind_targets = cycle.unwrap_or_else(|| vec![change.key.clone()]);
                for target in &behind_targets {
                    self.enqueue_changes_behind(target, queue_name, quiet);
                }

                if live {
                    for pipeline_name in self.pipeline.supercedes.clone() {
                        self.supersede_requests
                            .push(SupersedeRequest { pipeline_name, change: change.key.clone() });
                    }
                }

                true
            }
            Err(failed_at) => {
                self.dequeue_incomplete_cycle(&failed_at);
                false
            }
        }
    }

    /// `enqueueChangesBehind`, spec §4.1, §9: now that `admitted` has been
    /// queued, pull in already-known dependents that declared a
    /// `Depends-On:` against it so they queue up directly behind it
    /// instead of waiting for their own trigger event to notice.
    fn enqueue_changes_behind(&mut self, admitted: &ChangeKey, queue_name: &str, quiet: bool) {
        for dependent_key in self.resolver.dependents_of(admitted) {
            if let Some(queue) = self.pipeline.queue_named(queue_name) {
                if queue.has_live_change(&dependent_key) {
                    continue;
                }
            }
            let Some(source) = self.source_for(&dependent_key.connection) else { continue };
            match source.get_change_by_key(&dependent_key) {
                Ok(Some(dependent_change)) => {
                    self.add_change(dependent_change, queue_name, true, quiet, false);
                }
                Ok(None) => {}
                Err(err) => self.warn_collaborator_error("get_change_by_key", &err),
            }
        }
    }

    /// Recursively enqueue each needed change ahead of the live one, in the
    /// order declared. Returns the item ids created (for bundle formation)
    /// or the `ChangeKey` enqueue-ahead failed on (for rollback).
    fn enqueue_changes_ahead(
        &mut self,
        needed: &[Change],
        queue_name: &str,
        quiet: bool,
    ) -> Result<Vec<uuid::Uuid>, ChangeKey> {
        let mut created = Vec::new();
        for dep in needed {
            if let Some(queue) = self.pipeline.queue_named(queue_name) {
                if queue.has_live_change(&dep.key) {
                    continue;
                }
            }
            let item = QueueItem::new(dep.clone(), queue_name, false, quiet);
            let id = item.id;
            self.get_or_create_queue(queue_name).enqueue_change(item);
            created.push(id);
        }
        Ok(created)
    }

    fn form_or_extend_bundle(&mut self, item_id: uuid::Uuid, ahead_ids: &[uuid::Uuid], cycle: &[ChangeKey]) {
        let existing = self.bundles.values_mut().find(|b| {
            b.items.iter().any(|existing_id| {
                [item_id].iter().chain(ahead_ids).any(|id| id == existing_id)
            })
        });
        let mut members = ahead_ids.to_vec();
        members.push(item_id);
        if let Some(bundle) = existing {
            for m in members {
                bundle.extend(m);
            }
        } else {
            let bundle = Bundle::new(members);
            let bundle_id = bundle.id;
            self.bundles.insert(bundle_id, bundle);
            for queue in &mut self.pipeline.queues {
                for id in ahead_ids.iter().chain(std::iter::once(&item_id)) {
                    if cycle.iter().any(|k| queue.item(*id).map(|i| &i.change.key) == Some(k)) {
                        if let Some(item) = queue.item_mut(*id) {
                            item.bundle_id = Some(bundle_id);
                        }
                    }
                }
            }
        }
    }

    /// Injects one synthetic failing item carrying the cycle warning and
    /// dequeues it immediately (spec §4.1 "cycle not permitted", §7).
    fn enqueue_cycle_failure(&mut self, change: Change, queue_name: &str, cycle: Vec<ChangeKey>, quiet: bool) {
        let mut item = QueueItem::new(change, queue_name, true, quiet);
        item.build_set.failing_reasons.push(format!(
            "Dependency cycle detected and not permitted for this project: {}",
            cycle.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(" -> ")
        ));
        item.state = ItemState::Reportable;
        let id = item.id;
        self.get_or_create_queue(queue_name).enqueue_change(item);
        self.get_or_create_queue(queue_name).dequeue_item(id);
    }

    /// Best-effort rollback when enqueue-ahead fails partway through a
    /// cycle: remove whatever of the partially-enqueued cycle made it in
    /// (spec §4.3 `dequeueIncompleteCycle`).
    fn dequeue_incomplete_cycle(&mut self, failed_at: &ChangeKey) {
        for queue in &mut self.pipeline.queues {
            let stale: Vec<uuid::Uuid> = queue
                .items()
                .iter()
                .filter(|i| i.change.key.is_same_change(failed_at) || !i.live)
                .map(|i| i.id)
                .collect();
            for id in stale {
                queue.dequeue_item(id);
            }
        }
    }

    fn resolve_commit_dependencies(&self, change: &Change) -> anyhow::Result<Vec<Change>> {
        self.resolver.resolve_commit_dependencies(change, &self.sources)
    }

    /// Ref-filter application is a per-pipeline-trigger policy the spec
    /// leaves abstract (§4.1); absent a configured filter, everything
    /// passes.
    fn passes_ref_filters(&self, _change: &Change) -> bool {
        true
    }

    /// `removeOldVersionsOfChange`, spec §4.1: if the pipeline dequeues on
    /// new patchsets, drop any live item that is an older revision of
    /// `change`. Returns the queue name the stale item was found in, if
    /// any, so the caller can re-enqueue the new patchset there.
    pub fn remove_old_versions_of_change(&mut self, change: &Change) -> Option<String> {
        if !self.pipeline.dequeue_on_new_patchset {
            return None;
        }
        let mut found_queue = None;
        for queue in &mut self.pipeline.queues {
            let stale: Vec<uuid::Uuid> = queue
                .items()
                .iter()
                .filter(|i| i.live && change.key.is_newer_patchset_of(&i.change.key))
                .map(|i| i.id)
                .collect();
            if !stale.is_empty() {
                found_queue = Some(queue.name.clone());
            }
            for id in stale {
                queue.dequeue_item(id);
            }
        }
        found_queue
    }

    /// `removeAbandonedChange`, spec §4.1.
    pub fn remove_abandoned_change(&mut self, change: &Change) {
        for queue in &mut self.pipeline.queues {
            let matching: Vec<uuid::Uuid> =
                queue.items().iter().filter(|i| i.live && i.change.key == change.key).map(|i| i.id).collect();
            for id in matching {
                queue.dequeue_item(id);
            }
        }
    }

    /// `reEnqueueItem`, spec §4.1: re-insert after a layout invalidation,
    /// optionally preserving a frozen job graph.
    pub fn re_enqueue_item(&mut self, item_id: uuid::Uuid, queue_name: &str, target_ahead: Option<uuid::Uuid>, preserve_job_graph: bool) {
        if let Some(queue) = self.pipeline.queue_named_mut(queue_name) {
            if let Some(item) = queue.item_mut(item_id) {
                item.reset_build_set(preserve_job_graph);
            }
            queue.move_item(item_id, target_ahead);
        }
    }
}
