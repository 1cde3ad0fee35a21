// Background execution of provisioning jobs: worker identity, the lease
// lock, and the step-driving job runner.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::workflow::{EntityRecord, JobState};

pub mod job;
pub mod lease;

pub use job::{JobRunner, RunOutcome};
pub use lease::LeaseLock;

/// Stable worker identity: one source of truth for "who am I", constructed
/// once at startup and passed down. Lock ownership and log lines both use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerId(String);

impl WorkerId {
    /// hostname + pid + worker index, e.g. `app-03:4172:0`.
    pub fn for_process(index: u32) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());
        WorkerId(format!("{host}:{}:{index}", std::process::id()))
    }

    pub fn new(raw: impl Into<String>) -> Self {
        WorkerId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A domain-level provisioning failure. Infrastructure errors from the store
/// travel separately; this is "the work itself failed".
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProvisionError(String);

impl ProvisionError {
    pub fn new(message: impl Into<String>) -> Self {
        ProvisionError(message.into())
    }
}

/// The core provisioning work, performed by an external collaborator. Both
/// operations must be idempotent (check-before-create) because the runner
/// may repeat them after crashes or lease expiry.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision the client environment for a paid job.
    async fn provision(&self, job: &EntityRecord<JobState>) -> Result<(), ProvisionError>;

    /// Best-effort secondary migration after successful provisioning.
    /// Failures are logged by the runner and never block the welcome email.
    async fn migrate_documents(&self, job: &EntityRecord<JobState>) -> Result<(), ProvisionError>;
}
