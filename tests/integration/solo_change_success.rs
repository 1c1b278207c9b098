//! Spec §8 scenario 1: a solo change with no dependencies merges and its
//! single job succeeds, reporting `enqueue`, `start`, `success`.

use conveyor::collaborators::executor::JobCompletion;
use conveyor::collaborators::merger::MergeCompletion;
use conveyor::collaborators::nodepool::NodeRequestStatus;
use conveyor::manager::{Event, PipelineManager};
use conveyor::model::{Change, ItemState, Pipeline};
use conveyor::semaphore::{MemoryCoordinationStore, SemaphoreHandler};

use crate::common::{key, FakeConfigLoader, FakeExecutor, FakeMerger, FakeNodepool, FakeSource, MergerCallKind};

#[test]
fn solo_change_is_enqueued_runs_and_reports_success() {
    let mut pipeline = Pipeline::new("gate", "example");
    pipeline.actions.success_actions = vec!["vote+2".to_string()];
    pipeline.queues.push(conveyor::queue::change_queue::ChangeQueue::new_dynamic("gate", 20));

    let store = MemoryCoordinationStore::new();
    let semaphore = SemaphoreHandler::new(&store, "example");
    let source = FakeSource::new("gerrit");
    let merger = FakeMerger::default();
    let executor = FakeExecutor::default();
    let nodepool = FakeNodepool::default();
    let config_loader = FakeConfigLoader { jobs: vec!["j1".to_string()] };

    let mut manager = PipelineManager::new(pipeline, semaphore, vec![&source], &config_loader, &merger, &executor, &nodepool);

    let change = Change::new(key("A", 1), "refs/changes/1/1/1", "Initial commit");
    manager.handle_event(Event::ChangeProposed {
        change,
        queue_name: "gate".to_string(),
        live: true,
        quiet: false,
        ignore_requirements: false,
    });

    let item_id = manager.pipeline.queue_named("gate").unwrap().items()[0].id;
    assert_eq!(manager.pipeline.queue_named("gate").unwrap().item(item_id).unwrap().state, ItemState::FilesPending);

    for (id, kind) in merger.drain() {
        assert_eq!(kind, MergerCallKind::Files);
        manager.handle_event(Event::MergeComplete {
            item_id: id,
            completion: MergeCompletion { files: vec!["zuul.yaml".to_string()], ..Default::default() },
        });
    }

    for (id, kind) in merger.drain() {
        assert_eq!(kind, MergerCallKind::Merge);
        manager.handle_event(Event::MergeComplete {
            item_id: id,
            completion: MergeCompletion { merged: true, commit: Some("abc".to_string()), ..Default::default() },
        });
    }

    for (id, kind) in merger.drain() {
        assert_eq!(kind, MergerCallKind::RepoState);
        manager.handle_event(Event::MergeComplete { item_id: id, completion: MergeCompletion::default() });
    }

    let requests = nodepool.drain();
    assert_eq!(requests.len(), 1);
    for (id, job_name, request_id) in requests {
        manager.handle_event(Event::NodeRequestComplete {
            item_id: id,
            request_id,
            status: NodeRequestStatus { fulfilled: true, nodes: vec!["node1".to_string()] },
        });
        assert_eq!(job_name, "j1");
    }

    let executed = executor.drain();
    assert_eq!(executed.len(), 1);
    for (id, job_name) in executed {
        manager.handle_event(Event::BuildComplete { item_id: id, completion: JobCompletion { job_name, succeeded: true, retryable: false } });
    }

    assert!(manager.pipeline.queue_named("gate").is_none());
    assert!(manager.pipeline.queues.is_empty());
    assert_eq!(manager.pipeline.state.consecutive_failures, 0);
}
