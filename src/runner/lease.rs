// Short-TTL lease lock per job, built on the store's conditional update.
//
// Optimistic, expiry-based mutual exclusion - not a consensus primitive. A
// crashed holder's lease self-heals once the TTL elapses; the brief window
// where a straggler and a fresh worker both believe they hold it is bounded
// by clock skew and absorbed by idempotent job steps.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, warn};

use crate::store::{Condition, DocumentStore, Predicate, StoreError};
use crate::workflow::EntityId;

use super::WorkerId;

pub struct LeaseLock {
    store: Arc<dyn DocumentStore>,
    collection: &'static str,
    worker: WorkerId,
    ttl: Duration,
}

impl LeaseLock {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: &'static str,
        worker: WorkerId,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            collection,
            worker,
            ttl,
        }
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// Try to take the lease. One conditional update: succeeds iff no lock is
    /// held or the held lock's expiry has passed. Expired leases are claimed,
    /// never proactively cleared on behalf of other workers.
    pub async fn acquire(&self, key: &EntityId) -> Result<bool, StoreError> {
        let now = Utc::now();
        let free_or_expired = Predicate::Any(vec![
            Condition::Absent {
                field: "lock_owner".to_string(),
            },
            Condition::Before {
                field: "lock_expires_at".to_string(),
                instant: now,
            },
        ]);
        let patch = json!({
            "lock_owner": self.worker.as_str(),
            "lock_expires_at": now + self.ttl,
        });

        let acquired = self
            .store
            .conditional_update(self.collection, key.as_str(), &free_or_expired, patch)
            .await?;
        if acquired {
            debug!(key = %key, worker = %self.worker, ttl_seconds = self.ttl.num_seconds(), "lease acquired");
        } else {
            debug!(key = %key, worker = %self.worker, "lease unavailable");
        }
        Ok(acquired)
    }

    /// Clear the lease, conditional on still owning it. A straggler whose TTL
    /// lapsed must not clear a successor's lease; `false` reports that case.
    pub async fn release(&self, key: &EntityId) -> Result<bool, StoreError> {
        let still_mine = Predicate::All(vec![Condition::Equals {
            field: "lock_owner".to_string(),
            value: json!(self.worker.as_str()),
        }]);
        let patch = json!({
            "lock_owner": null,
            "lock_expires_at": null,
        });

        let released = self
            .store
            .conditional_update(self.collection, key.as_str(), &still_mine, patch)
            .await?;
        if released {
            debug!(key = %key, worker = %self.worker, "lease released");
        } else {
            warn!(key = %key, worker = %self.worker, "lease no longer ours at release");
        }
        Ok(released)
    }
}
