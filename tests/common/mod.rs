//! Shared test harness: in-memory store, recording notifier, and a scripted
//! provisioner, wired the way a worker process would wire the real
//! collaborators.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;

use conveyor::{
    DocumentStore, EntityId, EntityRecord, InMemoryDocumentStore, JobRunner, JobState, LeaseLock,
    LifecycleController, OrderState, ProvisionError, Provisioner, RecordingNotifier,
    TransitionTable, WorkerId, WorkflowState,
};

pub struct OrderHarness {
    pub store: Arc<InMemoryDocumentStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub controller: Arc<LifecycleController<OrderState>>,
}

pub fn order_harness() -> OrderHarness {
    let store = Arc::new(InMemoryDocumentStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let controller = Arc::new(LifecycleController::new(
        store.clone(),
        notifier.clone(),
        TransitionTable::orders(),
    ));
    OrderHarness {
        store,
        notifier,
        controller,
    }
}

pub struct JobHarness {
    pub store: Arc<InMemoryDocumentStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub controller: Arc<LifecycleController<JobState>>,
    pub provisioner: Arc<ScriptedProvisioner>,
}

pub fn job_harness() -> JobHarness {
    let store = Arc::new(InMemoryDocumentStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let controller = Arc::new(LifecycleController::new(
        store.clone(),
        notifier.clone(),
        TransitionTable::provisioning_jobs(),
    ));
    JobHarness {
        store,
        notifier,
        controller,
        provisioner: Arc::new(ScriptedProvisioner::default()),
    }
}

impl JobHarness {
    pub fn runner(&self, worker: &str, ttl: Duration, max_attempts: u32) -> JobRunner {
        JobRunner::new(
            self.controller.clone(),
            LeaseLock::new(
                self.store.clone(),
                "provisioning_jobs",
                WorkerId::new(worker),
                ttl,
            ),
            self.provisioner.clone(),
            self.notifier.clone(),
            max_attempts,
        )
    }
}

/// Seed an entity document directly in an arbitrary state, bypassing the
/// controller, for matrix tests and crash-leftover scenarios.
pub async fn seed_entity<S: WorkflowState>(
    store: &InMemoryDocumentStore,
    status: S,
    mutate: impl FnOnce(&mut EntityRecord<S>),
) -> EntityId {
    let mut record = EntityRecord::new(status, Value::Null, Utc::now());
    mutate(&mut record);
    let id = record.entity_id.clone();
    let inserted = store
        .insert_new(S::KIND.collection(), id.as_str(), record.to_doc().unwrap())
        .await
        .unwrap();
    assert!(inserted, "seed collided with an existing document");
    id
}

/// Provisioner with scriptable failures and call counting. Idempotent the
/// way the real one must be: repeating a successful call is harmless.
#[derive(Default)]
pub struct ScriptedProvisioner {
    fail_remaining: Mutex<u32>,
    provision_calls: Mutex<u32>,
    migration_fails: Mutex<bool>,
    delay: Mutex<Option<std::time::Duration>>,
}

impl ScriptedProvisioner {
    /// Fail the next `n` provision calls.
    pub fn fail_next(&self, n: u32) {
        *self.fail_remaining.lock().unwrap() = n;
    }

    pub fn fail_migration(&self) {
        *self.migration_fails.lock().unwrap() = true;
    }

    /// Hold each provision call open for `delay` (concurrency tests).
    pub fn slow(&self, delay: std::time::Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn provision_calls(&self) -> u32 {
        *self.provision_calls.lock().unwrap()
    }
}

#[async_trait]
impl Provisioner for ScriptedProvisioner {
    async fn provision(&self, _job: &EntityRecord<JobState>) -> Result<(), ProvisionError> {
        *self.provision_calls.lock().unwrap() += 1;
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let should_fail = {
            let mut remaining = self.fail_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        };
        if should_fail {
            Err(ProvisionError::new("tenant bootstrap failed"))
        } else {
            Ok(())
        }
    }

    async fn migrate_documents(&self, _job: &EntityRecord<JobState>) -> Result<(), ProvisionError> {
        if *self.migration_fails.lock().unwrap() {
            Err(ProvisionError::new("legacy document backfill failed"))
        } else {
            Ok(())
        }
    }
}
