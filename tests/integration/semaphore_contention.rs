//! Spec §8 scenario 5: a semaphore with `max_count=2`. Three items (X, Y,
//! Z) each want it; X and Y acquire immediately, Z is blocked until one of
//! them releases.

use conveyor::semaphore::{MemoryCoordinationStore, SemaphoreHandler, SemaphoreSpec};
use uuid::Uuid;

#[test]
fn third_contender_blocks_until_a_holder_releases() {
    let store = MemoryCoordinationStore::new();
    let handler = SemaphoreHandler::new(&store, "example");
    let spec = SemaphoreSpec { name: "build-pool".to_string(), max_count: 2, resources_first: false };

    let x = Uuid::new_v4();
    let y = Uuid::new_v4();
    let z = Uuid::new_v4();

    assert!(handler.acquire(x, "job", Some(&spec), false).unwrap());
    assert!(handler.acquire(y, "job", Some(&spec), false).unwrap());
    assert!(!handler.acquire(z, "job", Some(&spec), false).unwrap(), "semaphore is full at max_count=2");
    assert_eq!(handler.semaphore_holders("build-pool").unwrap().len(), 2);

    // Re-requesting while blocked is idempotent: still denied, still two
    // holders, not a third phantom entry.
    assert!(!handler.acquire(z, "job", Some(&spec), false).unwrap());
    assert_eq!(handler.semaphore_holders("build-pool").unwrap().len(), 2);

    handler.release_named("build-pool", x, "job").unwrap();
    assert_eq!(handler.semaphore_holders("build-pool").unwrap().len(), 1);

    assert!(handler.acquire(z, "job", Some(&spec), false).unwrap(), "a freed slot admits the blocked contender");
    assert_eq!(handler.semaphore_holders("build-pool").unwrap().len(), 2);

    let holders = handler.semaphore_holders("build-pool").unwrap();
    assert!(holders.iter().any(|h| h.starts_with(&y.to_string())));
    assert!(holders.iter().any(|h| h.starts_with(&z.to_string())));
}
