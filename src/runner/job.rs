// Job runner: drives a provisioning job through its fixed step sequence,
// resuming from whatever step was last completed and retrying only the
// failed tail.
//
// The expensive core step and the cheap delivery step retry on different
// tracks. A full restart (from FAILED) burns an attempt and re-runs
// everything; a delivery retry (from PROVISIONING_COMPLETED) re-sends the
// welcome email and nothing else.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::notify::{idempotency_key, Notifier, NotifyOutcome};
use crate::workflow::{
    EntityId, EntityRecord, JobState, LifecycleController, TransitionRequest, WorkflowError,
};

use super::{LeaseLock, Provisioner};

const WELCOME_EMAIL_TEMPLATE: &str = "welcome_email";
const ADMIN_ALERT_TEMPLATE: &str = "provisioning_failed_alert";

/// What one `run` call did. `LockBusy` and `AlreadyComplete` are normal
/// outcomes, not failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Job already reached terminal success; nothing to do, no lock taken.
    AlreadyComplete,
    /// Another worker holds the lease.
    LockBusy,
    /// Attempt budget spent; the job stays FAILED for manual intervention.
    AttemptsExhausted,
    /// Provisioned (or resumed) and the welcome email is out.
    Completed,
    /// Core step failed; job is FAILED with the attempt budget not yet spent.
    ProvisioningFailed { attempts: u32 },
    /// Provisioning succeeded earlier but the welcome email did not go out;
    /// the job stays PROVISIONING_COMPLETED and only delivery will retry.
    NotificationDeferred,
}

pub struct JobRunner {
    controller: Arc<LifecycleController<JobState>>,
    lease: LeaseLock,
    provisioner: Arc<dyn Provisioner>,
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
}

impl JobRunner {
    pub fn new(
        controller: Arc<LifecycleController<JobState>>,
        lease: LeaseLock,
        provisioner: Arc<dyn Provisioner>,
        notifier: Arc<dyn Notifier>,
        max_attempts: u32,
    ) -> Self {
        Self {
            controller,
            lease,
            provisioner,
            notifier,
            max_attempts,
        }
    }

    /// Execute one unit of work for the job. Safe to call concurrently from
    /// any number of workers and safe to repeat: every step is idempotent or
    /// guarded by the lease.
    pub async fn run(&self, job_id: &EntityId) -> Result<RunOutcome, WorkflowError> {
        let job = self.controller.get(job_id).await?;
        match job.status {
            JobState::WelcomeEmailSent => {
                debug!(job_id = %job_id, "job already complete");
                return Ok(RunOutcome::AlreadyComplete);
            }
            JobState::Failed if job.attempt_count >= self.max_attempts => {
                debug!(
                    job_id = %job_id,
                    attempts = job.attempt_count,
                    "attempt budget spent; no further runs needed"
                );
                return Ok(RunOutcome::AttemptsExhausted);
            }
            _ => {}
        }

        if !self.lease.acquire(job_id).await? {
            return Ok(RunOutcome::LockBusy);
        }
        let outcome = self.run_locked(job_id).await;
        if let Err(e) = self.lease.release(job_id).await {
            warn!(job_id = %job_id, error = %e, "lease release failed; lease will expire on its own");
        }
        outcome
    }

    async fn run_locked(&self, job_id: &EntityId) -> Result<RunOutcome, WorkflowError> {
        // Re-read under the lease; the pre-lock read may be stale.
        let job = self.controller.get(job_id).await?;
        match job.status {
            JobState::WelcomeEmailSent => Ok(RunOutcome::AlreadyComplete),
            JobState::ProvisioningCompleted => {
                // Last mile only. The expensive work is done and must not be
                // redone because a mail provider had a bad day.
                self.deliver_welcome(job).await
            }
            JobState::Failed => {
                if job.attempt_count >= self.max_attempts {
                    return Ok(RunOutcome::AttemptsExhausted);
                }
                info!(
                    job_id = %job_id,
                    attempts = job.attempt_count,
                    "restarting failed job from the top"
                );
                let job = self
                    .controller
                    .transition(job_id, JobState::PaymentConfirmed, TransitionRequest::system())
                    .await?;
                self.controller.clear_last_error(job_id).await?;
                self.execute_provisioning(job).await
            }
            JobState::PaymentConfirmed | JobState::ProvisioningStarted => {
                self.execute_provisioning(job).await
            }
        }
    }

    /// Run the core step. The attempt is persisted and the job is marked
    /// PROVISIONING_STARTED before any work happens, so a crash mid-work is
    /// observable and retryable.
    async fn execute_provisioning(
        &self,
        job: EntityRecord<JobState>,
    ) -> Result<RunOutcome, WorkflowError> {
        let job_id = job.entity_id.clone();
        let attempts = self.controller.record_attempt(&job_id).await?;

        let job = if job.status == JobState::PaymentConfirmed {
            self.controller
                .transition(&job_id, JobState::ProvisioningStarted, TransitionRequest::system())
                .await?
        } else {
            // Already PROVISIONING_STARTED: a previous worker crashed
            // mid-work and its lease expired. The step is idempotent, so
            // re-running it from here is the resume path.
            debug!(job_id = %job_id, "resuming crashed provisioning attempt");
            job
        };

        match self.provisioner.provision(&job).await {
            Err(cause) => {
                let failed = self
                    .controller
                    .transition(&job_id, JobState::Failed, TransitionRequest::system())
                    .await?;
                self.controller.set_last_error(&job_id, &cause.to_string()).await?;
                warn!(
                    job_id = %job_id,
                    attempts,
                    max_attempts = self.max_attempts,
                    error = %cause,
                    "provisioning step failed"
                );

                if attempts >= self.max_attempts {
                    self.alert_admins(&failed).await;
                    Ok(RunOutcome::AttemptsExhausted)
                } else {
                    Ok(RunOutcome::ProvisioningFailed { attempts })
                }
            }
            Ok(()) => {
                let job = self
                    .controller
                    .transition(&job_id, JobState::ProvisioningCompleted, TransitionRequest::system())
                    .await?;
                self.controller.clear_last_error(&job_id).await?;
                info!(job_id = %job_id, attempts, "provisioning completed");

                if let Err(cause) = self.provisioner.migrate_documents(&job).await {
                    warn!(
                        job_id = %job_id,
                        error = %cause,
                        "secondary document migration failed; continuing to delivery"
                    );
                }

                self.deliver_welcome(job).await
            }
        }
    }

    /// Send the welcome email. On failure the job stays in
    /// PROVISIONING_COMPLETED with `last_error` set; a later run retries
    /// delivery alone, re-using the same idempotency key so the channel can
    /// deduplicate. The full-restart attempt counter is untouched here.
    async fn deliver_welcome(
        &self,
        job: EntityRecord<JobState>,
    ) -> Result<RunOutcome, WorkflowError> {
        let job_id = job.entity_id.clone();
        let key = idempotency_key(job_id.as_str(), WELCOME_EMAIL_TEMPLATE);
        let outcome = self
            .notifier
            .notify(WELCOME_EMAIL_TEMPLATE, &job.notification_context(), &key)
            .await;

        match outcome {
            NotifyOutcome::Failed { message } => {
                self.controller.set_last_error(&job_id, &message).await?;
                warn!(
                    job_id = %job_id,
                    error = %message,
                    "welcome email failed; job stays PROVISIONING_COMPLETED for delivery-only retry"
                );
                Ok(RunOutcome::NotificationDeferred)
            }
            settled => {
                if settled == NotifyOutcome::Blocked {
                    warn!(job_id = %job_id, "welcome email blocked for this recipient; treating delivery as settled");
                }
                self.controller
                    .transition(&job_id, JobState::WelcomeEmailSent, TransitionRequest::system())
                    .await?;
                self.controller.clear_last_error(&job_id).await?;
                info!(job_id = %job_id, "job complete");
                Ok(RunOutcome::Completed)
            }
        }
    }

    /// Escalation once the attempt budget is spent. Fire-and-forget: the
    /// outcome is logged, never allowed to affect job state, and the
    /// idempotency key keeps the alert to one per job.
    async fn alert_admins(&self, job: &EntityRecord<JobState>) {
        let key = idempotency_key(job.entity_id.as_str(), "admin_alert");
        let outcome = self
            .notifier
            .notify(ADMIN_ALERT_TEMPLATE, &job.notification_context(), &key)
            .await;
        match outcome {
            NotifyOutcome::Failed { message } => {
                error!(
                    job_id = %job.entity_id,
                    error = %message,
                    "admin alert failed; job remains FAILED for manual intervention"
                );
            }
            outcome => {
                info!(job_id = %job.entity_id, ?outcome, "admin alert dispatched");
            }
        }
    }
}
