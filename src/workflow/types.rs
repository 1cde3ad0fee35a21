// Core entity types shared by the lifecycle controller and the job runner.

use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Which kind of long-lived entity a state machine drives. Determines the
/// entity collection, the transition-log collection, and the id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Order,
    ProvisioningJob,
}

impl EntityKind {
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Order => "orders",
            EntityKind::ProvisioningJob => "provisioning_jobs",
        }
    }

    pub fn log_collection(&self) -> &'static str {
        match self {
            EntityKind::Order => "order_transitions",
            EntityKind::ProvisioningJob => "job_transitions",
        }
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityKind::Order => "ord",
            EntityKind::ProvisioningJob => "job",
        }
    }
}

/// Immutable, globally unique, human-legible entity identifier:
/// typed prefix + random lowercase alphanumeric suffix (`ord_x7k29qv3ma`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    const SUFFIX_LEN: usize = 10;

    pub fn generate(kind: EntityKind) -> Self {
        let suffix = Alphanumeric
            .sample_string(&mut rand::rng(), Self::SUFFIX_LEN)
            .to_lowercase();
        EntityId(format!("{}_{}", kind.id_prefix(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(raw: &str) -> Self {
        EntityId(raw.to_string())
    }
}

/// Who is asking for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    System,
    Admin,
    Customer,
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorType::System => "system",
            ActorType::Admin => "admin",
            ActorType::Customer => "customer",
        };
        f.write_str(s)
    }
}

/// Classification carried by every edge in a transition table and stamped on
/// every transition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionClass {
    System,
    AdminManual,
    ExternalActor,
}

impl TransitionClass {
    /// The one actor class legitimately allowed to drive an edge of this
    /// classification.
    pub fn permitted_actor(&self) -> ActorType {
        match self {
            TransitionClass::System => ActorType::System,
            TransitionClass::AdminManual => ActorType::Admin,
            TransitionClass::ExternalActor => ActorType::Customer,
        }
    }
}

/// Closed state enum of one entity type. States cross the store boundary as
/// SCREAMING_SNAKE_CASE strings, never free text.
pub trait WorkflowState:
    Copy + Clone + PartialEq + Eq + Hash + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const KIND: EntityKind;
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(raw: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == raw)
    }

    /// Document field stamped exactly once on first entry into this state,
    /// if it has one.
    fn entry_timestamp_field(&self) -> Option<&'static str> {
        None
    }
}

/// Compliance order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Created,
    InternalReview,
    PendingCustomer,
    InProgress,
    OnHold,
    Delivered,
    Completed,
    Cancelled,
}

impl WorkflowState for OrderState {
    const KIND: EntityKind = EntityKind::Order;
    const ALL: &'static [Self] = &[
        OrderState::Created,
        OrderState::InternalReview,
        OrderState::PendingCustomer,
        OrderState::InProgress,
        OrderState::OnHold,
        OrderState::Delivered,
        OrderState::Completed,
        OrderState::Cancelled,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            OrderState::Created => "CREATED",
            OrderState::InternalReview => "INTERNAL_REVIEW",
            OrderState::PendingCustomer => "PENDING_CUSTOMER",
            OrderState::InProgress => "IN_PROGRESS",
            OrderState::OnHold => "ON_HOLD",
            OrderState::Delivered => "DELIVERED",
            OrderState::Completed => "COMPLETED",
            OrderState::Cancelled => "CANCELLED",
        }
    }

    fn entry_timestamp_field(&self) -> Option<&'static str> {
        match self {
            OrderState::Completed => Some("completed_at"),
            OrderState::Cancelled => Some("cancelled_at"),
            _ => None,
        }
    }
}

/// Background provisioning job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    PaymentConfirmed,
    ProvisioningStarted,
    ProvisioningCompleted,
    WelcomeEmailSent,
    Failed,
}

impl WorkflowState for JobState {
    const KIND: EntityKind = EntityKind::ProvisioningJob;
    const ALL: &'static [Self] = &[
        JobState::PaymentConfirmed,
        JobState::ProvisioningStarted,
        JobState::ProvisioningCompleted,
        JobState::WelcomeEmailSent,
        JobState::Failed,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            JobState::PaymentConfirmed => "PAYMENT_CONFIRMED",
            JobState::ProvisioningStarted => "PROVISIONING_STARTED",
            JobState::ProvisioningCompleted => "PROVISIONING_COMPLETED",
            JobState::WelcomeEmailSent => "WELCOME_EMAIL_SENT",
            JobState::Failed => "FAILED",
        }
    }

    fn entry_timestamp_field(&self) -> Option<&'static str> {
        match self {
            JobState::WelcomeEmailSent => Some("completed_at"),
            JobState::Failed => Some("failed_at"),
            _ => None,
        }
    }
}

/// The entity document: a cached projection of the transition log plus the
/// bookkeeping the runner needs (attempts, lease, last error, SLA clock).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord<S> {
    pub entity_id: EntityId,
    pub status: S,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cumulative_paused_seconds: i64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl<S: WorkflowState> EntityRecord<S> {
    pub fn new(status: S, metadata: Value, now: DateTime<Utc>) -> Self {
        Self {
            entity_id: EntityId::generate(S::KIND),
            status,
            attempt_count: 0,
            lock_owner: None,
            lock_expires_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            sla_paused_at: None,
            cumulative_paused_seconds: 0,
            metadata,
        }
    }

    pub fn to_doc(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_doc(doc: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(doc)
    }

    /// Whether the lease on this record is currently held (present and
    /// unexpired). An expired lease reads as not held.
    pub fn lease_held_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.lock_owner, self.lock_expires_at) {
            (Some(_), Some(expires_at)) => expires_at > now,
            _ => false,
        }
    }

    /// Minimal context payload handed to the notification channel.
    pub fn notification_context(&self) -> Value {
        serde_json::json!({
            "entity_id": self.entity_id.as_str(),
            "status": self.status.as_str(),
            "metadata": self.metadata,
        })
    }
}
