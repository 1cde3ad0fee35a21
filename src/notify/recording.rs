// Recording notifier for tests and local development.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{Notifier, NotifyOutcome};

#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub template_key: String,
    pub context: Value,
    pub idempotency_key: String,
    pub outcome: NotifyOutcome,
}

/// Records every delivery attempt and deduplicates on idempotency key the
/// way a real channel would. Failures can be scripted per template: each
/// entry in the failure queue consumes one matching call.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<RecordedNotification>>,
    seen_keys: Mutex<HashSet<String>>,
    failures: Mutex<Vec<String>>,
    blocked_templates: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one failure for the next call delivering `template_key`.
    pub fn fail_next(&self, template_key: &str) {
        self.failures.lock().unwrap().push(template_key.to_string());
    }

    /// Treat every delivery of `template_key` as suppressed.
    pub fn block_template(&self, template_key: &str) {
        self.blocked_templates
            .lock()
            .unwrap()
            .insert(template_key.to_string());
    }

    pub fn recorded(&self) -> Vec<RecordedNotification> {
        self.sent.lock().unwrap().clone()
    }

    /// Attempts that actually went out (excludes failures and duplicates).
    pub fn delivered(&self, template_key: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.template_key == template_key && n.outcome == NotifyOutcome::Sent)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        template_key: &str,
        context: &Value,
        idempotency_key: &str,
    ) -> NotifyOutcome {
        let outcome = {
            let mut failures = self.failures.lock().unwrap();
            if let Some(pos) = failures.iter().position(|t| t == template_key) {
                failures.remove(pos);
                NotifyOutcome::Failed {
                    message: format!("scripted failure for {template_key}"),
                }
            } else if self.blocked_templates.lock().unwrap().contains(template_key) {
                NotifyOutcome::Blocked
            } else if !self
                .seen_keys
                .lock()
                .unwrap()
                .insert(idempotency_key.to_string())
            {
                NotifyOutcome::DuplicateIgnored
            } else {
                NotifyOutcome::Sent
            }
        };

        self.sent.lock().unwrap().push(RecordedNotification {
            template_key: template_key.to_string(),
            context: context.clone(),
            idempotency_key: idempotency_key.to_string(),
            outcome: outcome.clone(),
        });
        outcome
    }
}
