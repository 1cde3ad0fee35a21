// Outbound notification seam (email/SMS templates rendered elsewhere).
//
// Side-channel delivery never throws past this boundary: every call returns
// a `NotifyOutcome` the caller logs and acts on. Losing a notification must
// never be able to lose a state transition.

use async_trait::async_trait;
use serde_json::Value;

pub mod recording;

pub use recording::RecordingNotifier;

/// Result of a delivery attempt as reported by the downstream channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Accepted by the channel.
    Sent,
    /// Recipient is suppressed/opted out; retrying cannot succeed.
    Blocked,
    /// Channel failure; safe to retry with the same idempotency key.
    Failed { message: String },
    /// The channel has already seen this idempotency key.
    DuplicateIgnored,
}

impl NotifyOutcome {
    /// Whether the workflow should consider this delivery settled.
    /// `Blocked` counts: a suppressed recipient will not unblock on retry.
    pub fn is_settled(&self) -> bool {
        !matches!(self, NotifyOutcome::Failed { .. })
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `template_key` with the given entity context. Callers pass a
    /// deterministic `idempotency_key` derived from `(entity_id, step)` so
    /// repeated attempts across retries are deduplicated downstream.
    async fn notify(
        &self,
        template_key: &str,
        context: &Value,
        idempotency_key: &str,
    ) -> NotifyOutcome;
}

/// Deterministic idempotency key for a delivery step of an entity.
pub fn idempotency_key(entity_id: &str, step: &str) -> String {
    format!("{entity_id}:{step}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_covers_everything_but_failed() {
        assert!(NotifyOutcome::Sent.is_settled());
        assert!(NotifyOutcome::Blocked.is_settled());
        assert!(NotifyOutcome::DuplicateIgnored.is_settled());
        assert!(!NotifyOutcome::Failed {
            message: "smtp timeout".into()
        }
        .is_settled());
    }

    #[test]
    fn idempotency_key_is_deterministic() {
        assert_eq!(
            idempotency_key("job_abc123", "welcome_email"),
            "job_abc123:welcome_email"
        );
        assert_eq!(
            idempotency_key("job_abc123", "welcome_email"),
            idempotency_key("job_abc123", "welcome_email")
        );
    }
}
