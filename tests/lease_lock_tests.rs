//! Lease lock scenarios: contention inside the TTL window and self-healing
//! after a holder dies without releasing.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::seed_entity;
use conveyor::{DocumentStore, InMemoryDocumentStore, JobState, LeaseLock, WorkerId};

fn lock(store: &Arc<InMemoryDocumentStore>, worker: &str, ttl: Duration) -> LeaseLock {
    LeaseLock::new(
        store.clone(),
        "provisioning_jobs",
        WorkerId::new(worker),
        ttl,
    )
}

#[tokio::test]
async fn contender_fails_inside_the_ttl_window_then_a_late_acquire_succeeds() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let id = seed_entity(&*store, JobState::PaymentConfirmed, |_| {}).await;

    let ttl = Duration::milliseconds(300);
    let a = lock(&store, "worker-a", ttl);
    let b = lock(&store, "worker-b", ttl);
    let c = lock(&store, "worker-c", ttl);

    // A holds the lease; B contends within the window and loses.
    assert!(a.acquire(&id).await.unwrap());
    assert!(!b.acquire(&id).await.unwrap());

    // A dies without releasing. After the TTL elapses the lease reads as
    // free and a third worker claims it.
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    assert!(c.acquire(&id).await.unwrap());

    let doc = store
        .get("provisioning_jobs", id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["lock_owner"], "worker-c");
}

#[tokio::test]
async fn released_lease_is_immediately_reacquirable() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let id = seed_entity(&*store, JobState::PaymentConfirmed, |_| {}).await;

    let a = lock(&store, "worker-a", Duration::seconds(30));
    let b = lock(&store, "worker-b", Duration::seconds(30));

    assert!(a.acquire(&id).await.unwrap());
    assert!(!b.acquire(&id).await.unwrap());
    assert!(a.release(&id).await.unwrap());
    assert!(b.acquire(&id).await.unwrap());
}

#[tokio::test]
async fn acquiring_a_missing_job_does_not_invent_a_document() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let a = lock(&store, "worker-a", Duration::seconds(30));

    let missing = conveyor::EntityId::from("job_doesnotexist");
    assert!(!a.acquire(&missing).await.unwrap());
    assert!(store
        .get("provisioning_jobs", "job_doesnotexist")
        .await
        .unwrap()
        .is_none());
}
