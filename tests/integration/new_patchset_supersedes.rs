//! Spec §8 scenario 6: with `dequeue_on_new_patchset` enabled, a
//! `ChangeUpdated` event for a newer patchset dequeues the stale live item
//! and admits the new revision fresh.

use conveyor::manager::{Event, PipelineManager};
use conveyor::model::{Change, ItemState, Pipeline};
use conveyor::queue::change_queue::ChangeQueue;
use conveyor::semaphore::{MemoryCoordinationStore, SemaphoreHandler};

use crate::common::{key, FakeConfigLoader, FakeExecutor, FakeMerger, FakeNodepool, FakeSource};

#[test]
fn newer_patchset_dequeues_the_stale_revision_and_is_admitted_fresh() {
    let mut pipeline = Pipeline::new("gate", "example");
    pipeline.dequeue_on_new_patchset = true;
    pipeline.queues.push(ChangeQueue::new_dynamic("gate", 20));

    let store = MemoryCoordinationStore::new();
    let semaphore = SemaphoreHandler::new(&store, "example");
    let source = FakeSource::new("gerrit");
    let merger = FakeMerger::default();
    let executor = FakeExecutor::default();
    let nodepool = FakeNodepool::default();
    let config_loader = FakeConfigLoader { jobs: vec!["j1".to_string()] };

    let mut manager = PipelineManager::new(pipeline, semaphore, vec![&source], &config_loader, &merger, &executor, &nodepool);

    let patchset_1 = Change::new(key("A", 1), "refs/changes/1/1/1", "Initial commit");
    manager.handle_event(Event::ChangeProposed {
        change: patchset_1.clone(),
        queue_name: "gate".to_string(),
        live: true,
        quiet: false,
        ignore_requirements: false,
    });
    let old_item_id = manager.pipeline.queue_named("gate").unwrap().items()[0].id;
    assert_eq!(manager.pipeline.queue_named("gate").unwrap().item(old_item_id).unwrap().state, ItemState::FilesPending);
    merger.drain(); // the in-flight files request for patchset 1 is abandoned, not answered

    let patchset_2 = Change::new(key("A", 2), "refs/changes/1/1/2", "Revised commit");
    manager.handle_event(Event::ChangeUpdated { change: patchset_2.clone() });

    let queue = manager.pipeline.queue_named("gate").unwrap();
    assert_eq!(queue.len(), 1, "the stale patchset is gone, only the new one remains");
    assert!(queue.item(old_item_id).is_none());
    let new_item = &queue.items()[0];
    assert_eq!(new_item.change.key, patchset_2.key);
    assert_eq!(new_item.state, ItemState::FilesPending, "the new revision is admitted fresh from New");
}

#[test]
fn without_the_option_both_patchsets_coexist() {
    let mut pipeline = Pipeline::new("gate", "example");
    pipeline.dequeue_on_new_patchset = false;
    pipeline.queues.push(ChangeQueue::new_dynamic("gate", 20));

    let store = MemoryCoordinationStore::new();
    let semaphore = SemaphoreHandler::new(&store, "example");
    let source = FakeSource::new("gerrit");
    let merger = FakeMerger::default();
    let executor = FakeExecutor::default();
    let nodepool = FakeNodepool::default();
    let config_loader = FakeConfigLoader { jobs: vec!["j1".to_string()] };

    let mut manager = PipelineManager::new(pipeline, semaphore, vec![&source], &config_loader, &merger, &executor, &nodepool);

    manager.handle_event(Event::ChangeProposed {
        change: Change::new(key("A", 1), "refs/changes/1/1/1", "Initial commit"),
        queue_name: "gate".to_string(),
        live: true,
        quiet: false,
        ignore_requirements: false,
    });
    manager.handle_event(Event::ChangeUpdated { change: Change::new(key("A", 2), "refs/changes/1/1/2", "Revised commit") });

    assert_eq!(manager.pipeline.queue_named("gate").unwrap().len(), 2);
}
