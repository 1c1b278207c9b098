//! Spec §8 scenarios 2 and 3: a mutual `Depends-On:` cycle either merges
//! atomically as a bundle (when the project permits circular dependencies)
//! or is rejected with a single synthetic failure report (when it doesn't).

use conveyor::collaborators::executor::JobCompletion;
use conveyor::collaborators::merger::MergeCompletion;
use conveyor::collaborators::nodepool::NodeRequestStatus;
use conveyor::manager::{Event, PipelineManager};
use conveyor::model::{Change, ItemState, Pipeline};
use conveyor::semaphore::{MemoryCoordinationStore, SemaphoreHandler};

use crate::common::{key, FakeConfigLoader, FakeExecutor, FakeMerger, FakeNodepool, FakeSource, MergerCallKind};

fn cycle_sources() -> (FakeSource, Change, Change) {
    let source = FakeSource::new("gerrit");
    let a = Change::new(key("A", 1), "refs/changes/1/1/1", "Depends-On: https://gerrit/b");
    let b = Change::new(key("B", 1), "refs/changes/2/2/1", "Depends-On: https://gerrit/a");
    source.register("https://gerrit/b", b.clone());
    source.register("https://gerrit/a", a.clone());
    (source, a, b)
}

#[test]
fn permitted_cycle_forms_a_bundle_and_both_items_are_enqueued() {
    let mut pipeline = Pipeline::new("gate", "example");
    pipeline.allow_circular_dependencies = true;
    pipeline.queues.push(conveyor::queue::change_queue::ChangeQueue::new_dynamic("gate", 20));

    let store = MemoryCoordinationStore::new();
    let semaphore = SemaphoreHandler::new(&store, "example");
    let (source, a, b) = cycle_sources();
    let merger = FakeMerger::default();
    let executor = FakeExecutor::default();
    let nodepool = FakeNodepool::default();
    let config_loader = FakeConfigLoader { jobs: vec![] };

    let mut manager = PipelineManager::new(pipeline, semaphore, vec![&source], &config_loader, &merger, &executor, &nodepool);

    // B was walked earlier and already declared its own dependency on A;
    // this is the edge a prior `addChange(B)` would have recorded.
    manager.resolver.record_edge(b.key.clone(), vec![a.key.clone()]);

    let admitted = manager.handle_event(Event::ChangeProposed {
        change: a.clone(),
        queue_name: "gate".to_string(),
        live: true,
        quiet: false,
        ignore_requirements: false,
    });
    assert!(admitted);

    let queue = manager.pipeline.queue_named("gate").unwrap();
    assert_eq!(queue.len(), 2, "both cycle members should be enqueued");

    let a_item = queue.items().iter().find(|i| i.change.key.is_same_change(&a.key)).unwrap();
    let b_item = queue.items().iter().find(|i| i.change.key.is_same_change(&b.key)).unwrap();
    assert!(a_item.bundle_id.is_some());
    assert_eq!(a_item.bundle_id, b_item.bundle_id, "cycle members share one bundle");
    assert_eq!(manager.bundles.len(), 1);
}

/// Drive one bundle member from `FilesPending` through to `Reportable`
/// (a single successful job) without touching any other member.
fn advance_to_reportable(manager: &mut PipelineManager<'_>, nodepool: &FakeNodepool, item_id: uuid::Uuid) {
    manager.handle_event(Event::MergeComplete {
        item_id,
        completion: MergeCompletion { files: vec!["zuul.yaml".to_string()], ..Default::default() },
    });
    manager.handle_event(Event::MergeComplete {
        item_id,
        completion: MergeCompletion { merged: true, commit: Some("c".to_string()), ..Default::default() },
    });
    manager.handle_event(Event::MergeComplete { item_id, completion: MergeCompletion::default() });

    let request_id = nodepool
        .requests
        .borrow()
        .iter()
        .find(|(id, _, _)| *id == item_id)
        .map(|(_, _, request_id)| request_id.clone())
        .expect("node request issued for this item");
    manager.handle_event(Event::NodeRequestComplete {
        item_id,
        request_id,
        status: NodeRequestStatus { fulfilled: true, nodes: vec!["node1".to_string()] },
    });
    manager.handle_event(Event::BuildComplete {
        item_id,
        completion: JobCompletion { job_name: "job1".to_string(), succeeded: true, retryable: false },
    });
}

#[test]
fn bundle_member_holds_at_reportable_until_the_whole_bundle_finishes() {
    let mut pipeline = Pipeline::new("gate", "example");
    pipeline.allow_circular_dependencies = true;
    pipeline.actions.success_actions = vec!["vote+2".to_string()];
    pipeline.queues.push(conveyor::queue::change_queue::ChangeQueue::new_dynamic("gate", 20));

    let store = MemoryCoordinationStore::new();
    let semaphore = SemaphoreHandler::new(&store, "example");
    let (source, a, b) = cycle_sources();
    let merger = FakeMerger::default();
    let executor = FakeExecutor::default();
    let nodepool = FakeNodepool::default();
    let config_loader = FakeConfigLoader { jobs: vec!["job1".to_string()] };

    let mut manager = PipelineManager::new(pipeline, semaphore, vec![&source], &config_loader, &merger, &executor, &nodepool);
    manager.resolver.record_edge(b.key.clone(), vec![a.key.clone()]);

    manager.handle_event(Event::ChangeProposed {
        change: a.clone(),
        queue_name: "gate".to_string(),
        live: true,
        quiet: false,
        ignore_requirements: false,
    });

    let (a_id, b_id, bundle_id) = {
        let queue = manager.pipeline.queue_named("gate").unwrap();
        let a_item = queue.items().iter().find(|i| i.change.key.is_same_change(&a.key)).unwrap();
        let b_item = queue.items().iter().find(|i| i.change.key.is_same_change(&b.key)).unwrap();
        (a_item.id, b_item.id, a_item.bundle_id.unwrap())
    };

    for (_, kind) in merger.drain() {
        assert_eq!(kind, MergerCallKind::Files, "both members request files on admission");
    }

    // Only B is driven forward; A is left stuck at FilesPending.
    advance_to_reportable(&mut manager, &nodepool, b_id);
    let b_item = manager.pipeline.queue_named("gate").unwrap().item(b_id).unwrap().clone();
    assert_eq!(b_item.state, ItemState::Reportable, "B itself has nothing left to wait on");
    assert!(
        manager.pipeline.queue_named("gate").unwrap().item(b_id).is_some(),
        "the bundle gate holds B: A hasn't finished and neither has failed"
    );
    assert!(!manager.bundles.get(&bundle_id).unwrap().started_reporting);

    // Now A catches up; the gate opens and both report atomically.
    advance_to_reportable(&mut manager, &nodepool, a_id);

    assert!(manager.pipeline.queue_named("gate").is_none(), "both members reported and the dynamic queue emptied");
    let bundle = manager.bundles.get(&bundle_id).unwrap();
    assert!(bundle.started_reporting);
    assert!(!bundle.failed_reporting);
    assert_eq!(bundle.reported.get(&a_id), Some(&true));
    assert_eq!(bundle.reported.get(&b_id), Some(&true));
    assert_eq!(manager.pipeline.state.consecutive_failures, 0);
    assert_eq!(executor.drain().len(), 2, "each member ran its one job");
}

#[test]
fn forbidden_cycle_reports_a_single_failure_and_runs_no_jobs() {
    let mut pipeline = Pipeline::new("gate", "example");
    pipeline.allow_circular_dependencies = false;
    pipeline.actions.failure_actions = vec!["vote-1".to_string()];
    pipeline.queues.push(conveyor::queue::change_queue::ChangeQueue::new_dynamic("gate", 20));

    let store = MemoryCoordinationStore::new();
    let semaphore = SemaphoreHandler::new(&store, "example");
    let (source, a, b) = cycle_sources();
    let merger = FakeMerger::default();
    let executor = FakeExecutor::default();
    let nodepool = FakeNodepool::default();
    let config_loader = FakeConfigLoader { jobs: vec![] };

    let mut manager = PipelineManager::new(pipeline, semaphore, vec![&source], &config_loader, &merger, &executor, &nodepool);
    manager.resolver.record_edge(b.key.clone(), vec![a.key.clone()]);

    let admitted = manager.handle_event(Event::ChangeProposed {
        change: a,
        queue_name: "gate".to_string(),
        live: true,
        quiet: false,
        ignore_requirements: false,
    });
    assert!(!admitted, "a forbidden cycle is rejected at addChange");

    // The synthetic failing item was enqueued then immediately dequeued;
    // nothing is left resident in the queue and no collaborator was asked
    // to do any work.
    assert!(manager.pipeline.queue_named("gate").is_none());
    assert!(merger.drain().is_empty());
    assert!(executor.drain().is_empty());
    assert!(nodepool.drain().is_empty());
}
