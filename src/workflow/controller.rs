// Entity lifecycle controller: the single write path for entity documents.
//
// Every mutation - creation, validated transitions, attempt/error
// bookkeeping - goes through here. The store is not transactional across
// documents, so the ordering inside `transition` is the contract: entity
// write first, audit append second, notification last.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::notify::{idempotency_key, Notifier};
use crate::store::{DocumentStore, Predicate, StoreError};

use super::audit::{Actor, TransitionLog, TransitionRecord};
use super::sla;
use super::transitions::{TransitionRuling, TransitionTable};
use super::types::{ActorType, EntityId, EntityRecord, TransitionClass, WorkflowState};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("entity {entity_id} not found")]
    NotFound { entity_id: EntityId },
    #[error("invalid transition {from} -> {to} for {entity_id}; legal next states: {allowed:?}")]
    InvalidTransition {
        entity_id: EntityId,
        from: String,
        to: String,
        allowed: Vec<String>,
    },
    #[error("transition {from} -> {to} requires an admin actor, got {actor}")]
    PrivilegedActorRequired {
        from: String,
        to: String,
        actor: ActorType,
    },
    #[error("transition {from} -> {to} is admin-manual and requires a non-empty reason")]
    ReasonRequired { from: String, to: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Who is asking, why, and with what attached context.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
    pub metadata: Value,
}

impl TransitionRequest {
    pub fn system() -> Self {
        Self {
            actor_type: ActorType::System,
            actor_id: None,
            reason: None,
            metadata: Value::Null,
        }
    }

    pub fn admin(actor_id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Admin,
            actor_id: Some(actor_id.into()),
            reason: None,
            metadata: Value::Null,
        }
    }

    pub fn customer(actor_id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Customer,
            actor_id: Some(actor_id.into()),
            reason: None,
            metadata: Value::Null,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

pub struct LifecycleController<S: WorkflowState> {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    table: TransitionTable<S>,
    log: TransitionLog,
}

impl<S: WorkflowState> LifecycleController<S> {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        table: TransitionTable<S>,
    ) -> Self {
        let log = TransitionLog::new(store.clone(), S::KIND.log_collection());
        Self {
            store,
            notifier,
            table,
            log,
        }
    }

    pub fn table(&self) -> &TransitionTable<S> {
        &self.table
    }

    fn collection(&self) -> &'static str {
        S::KIND.collection()
    }

    async fn load(&self, entity_id: &EntityId) -> Result<EntityRecord<S>, WorkflowError> {
        let doc = self
            .store
            .get(self.collection(), entity_id.as_str())
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                entity_id: entity_id.clone(),
            })?;
        EntityRecord::from_doc(doc).map_err(|e| {
            WorkflowError::Store(StoreError::InvalidDocument {
                collection: self.collection().to_string(),
                key: entity_id.as_str().to_string(),
                detail: e.to_string(),
            })
        })
    }

    /// Create an entity in the table's initial state with a fresh id.
    pub async fn create(&self, metadata: Value) -> Result<EntityRecord<S>, WorkflowError> {
        let entity_id = EntityId::generate(S::KIND);
        self.create_with_id(entity_id, metadata).await
    }

    /// Create an entity under a caller-chosen id. Initiating events (payment
    /// confirmations, admin actions) derive the id from the event so a
    /// re-delivered event finds the existing entity and returns it unchanged
    /// instead of double-creating.
    pub async fn create_with_id(
        &self,
        entity_id: EntityId,
        metadata: Value,
    ) -> Result<EntityRecord<S>, WorkflowError> {
        let now = Utc::now();
        let initial = self.table.initial();
        let mut entity = EntityRecord::new(initial, metadata, now);
        entity.entity_id = entity_id.clone();

        let doc = entity.to_doc().map_err(StoreError::from)?;
        let inserted = self
            .store
            .insert_new(self.collection(), entity_id.as_str(), doc)
            .await?;
        if !inserted {
            debug!(
                entity_id = %entity_id,
                "initiating event re-delivered; returning existing entity"
            );
            return self.load(&entity_id).await;
        }

        let record = TransitionRecord::new(
            entity_id.clone(),
            None,
            initial.as_str(),
            TransitionClass::System,
            Actor {
                actor_type: ActorType::System,
                actor_id: None,
            },
            None,
            Value::Null,
            now,
        );
        if let Err(e) = self.log.record(&record).await {
            warn!(
                entity_id = %entity_id,
                error = %e,
                "creation persisted but audit append failed; log is behind"
            );
        }

        info!(
            entity_id = %entity_id,
            status = initial.as_str(),
            "entity created"
        );
        Ok(entity)
    }

    /// Validate and apply one transition. Requesting the state the entity is
    /// already in is a no-op so caller retries are safe; all other outcomes
    /// are either a single persisted transition or a typed caller error with
    /// the entity untouched.
    pub async fn transition(
        &self,
        entity_id: &EntityId,
        requested: S,
        request: TransitionRequest,
    ) -> Result<EntityRecord<S>, WorkflowError> {
        let mut entity = self.load(entity_id).await?;
        let current = entity.status;

        let class = match self.table.evaluate(current, requested, request.actor_type) {
            TransitionRuling::NoOp => {
                debug!(
                    entity_id = %entity_id,
                    status = current.as_str(),
                    "transition to current state requested; no-op"
                );
                return Ok(entity);
            }
            TransitionRuling::Rejected => {
                return Err(WorkflowError::InvalidTransition {
                    entity_id: entity_id.clone(),
                    from: current.as_str().to_string(),
                    to: requested.as_str().to_string(),
                    allowed: self
                        .table
                        .allowed_next(current)
                        .iter()
                        .map(|s| s.as_str().to_string())
                        .collect(),
                });
            }
            TransitionRuling::AdminRequired => {
                return Err(WorkflowError::PrivilegedActorRequired {
                    from: current.as_str().to_string(),
                    to: requested.as_str().to_string(),
                    actor: request.actor_type,
                });
            }
            TransitionRuling::Allowed(class) => class,
        };

        if class == TransitionClass::AdminManual
            && request.reason.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            return Err(WorkflowError::ReasonRequired {
                from: current.as_str().to_string(),
                to: requested.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let sla_fields = sla::apply_boundary(
            &self.table,
            current,
            requested,
            now,
            entity.sla_paused_at,
            entity.cumulative_paused_seconds,
        );

        let mut patch = json!({
            "status": requested.as_str(),
            "updated_at": now,
        });
        if sla_fields.sla_paused_at != entity.sla_paused_at
            || sla_fields.cumulative_paused_seconds != entity.cumulative_paused_seconds
        {
            patch["sla_paused_at"] = serde_json::to_value(sla_fields.sla_paused_at)
                .map_err(StoreError::from)?;
            patch["cumulative_paused_seconds"] = json!(sla_fields.cumulative_paused_seconds);
        }
        let stamp_field = requested
            .entry_timestamp_field()
            .filter(|field| self.entry_stamp_missing(&entity, field));
        if let Some(field) = stamp_field {
            patch[field] = json!(now);
        }

        let applied = self
            .store
            .conditional_update(
                self.collection(),
                entity_id.as_str(),
                &Predicate::always(),
                patch,
            )
            .await?;
        if !applied {
            // Entities are never deleted; a missing document here means the
            // caller raced a deletion outside the engine.
            return Err(WorkflowError::NotFound {
                entity_id: entity_id.clone(),
            });
        }

        entity.status = requested;
        entity.updated_at = now;
        entity.sla_paused_at = sla_fields.sla_paused_at;
        entity.cumulative_paused_seconds = sla_fields.cumulative_paused_seconds;
        match stamp_field {
            Some("completed_at") => entity.completed_at = Some(now),
            Some("failed_at") => entity.failed_at = Some(now),
            Some("cancelled_at") => entity.cancelled_at = Some(now),
            _ => {}
        }

        let record = TransitionRecord::new(
            entity_id.clone(),
            Some(current.as_str()),
            requested.as_str(),
            class,
            Actor {
                actor_type: request.actor_type,
                actor_id: request.actor_id.clone(),
            },
            request.reason.clone(),
            request.metadata.clone(),
            now,
        );
        if let Err(e) = self.log.record(&record).await {
            // Recoverable inconsistency: the entity state is correct, only
            // the trail is momentarily behind. Never roll back.
            warn!(
                entity_id = %entity_id,
                from = current.as_str(),
                to = requested.as_str(),
                error = %e,
                "transition persisted but audit append failed; log is behind"
            );
        }

        info!(
            entity_id = %entity_id,
            from = current.as_str(),
            to = requested.as_str(),
            actor = %request.actor_type,
            "transition applied"
        );

        if let Some(template) = self.table.notification_template(requested) {
            let key = idempotency_key(entity_id.as_str(), requested.as_str());
            let outcome = self
                .notifier
                .notify(template, &entity.notification_context(), &key)
                .await;
            if outcome.is_settled() {
                debug!(entity_id = %entity_id, template, ?outcome, "stakeholder notification settled");
            } else {
                warn!(entity_id = %entity_id, template, ?outcome, "stakeholder notification failed; transition stands");
            }
        }

        Ok(entity)
    }

    /// Increment and persist the attempt counter, returning the new count.
    /// Runs before the risky step so a crash mid-work still burned the
    /// attempt. Not a state transition; writes no audit row.
    pub async fn record_attempt(&self, entity_id: &EntityId) -> Result<u32, WorkflowError> {
        let entity = self.load(entity_id).await?;
        let next = entity.attempt_count + 1;
        self.patch_bookkeeping(
            entity_id,
            json!({"attempt_count": next, "updated_at": Utc::now()}),
        )
        .await?;
        Ok(next)
    }

    pub async fn set_last_error(
        &self,
        entity_id: &EntityId,
        message: &str,
    ) -> Result<(), WorkflowError> {
        self.patch_bookkeeping(
            entity_id,
            json!({"last_error": message, "updated_at": Utc::now()}),
        )
        .await
    }

    pub async fn clear_last_error(&self, entity_id: &EntityId) -> Result<(), WorkflowError> {
        self.patch_bookkeeping(
            entity_id,
            json!({"last_error": null, "updated_at": Utc::now()}),
        )
        .await
    }

    async fn patch_bookkeeping(
        &self,
        entity_id: &EntityId,
        patch: Value,
    ) -> Result<(), WorkflowError> {
        let applied = self
            .store
            .conditional_update(
                self.collection(),
                entity_id.as_str(),
                &Predicate::always(),
                patch,
            )
            .await?;
        if !applied {
            return Err(WorkflowError::NotFound {
                entity_id: entity_id.clone(),
            });
        }
        Ok(())
    }

    pub async fn get(&self, entity_id: &EntityId) -> Result<EntityRecord<S>, WorkflowError> {
        self.load(entity_id).await
    }

    /// Transition history for the entity, oldest first.
    pub async fn history(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<TransitionRecord>, WorkflowError> {
        Ok(self.log.history(entity_id).await?)
    }

    fn entry_stamp_missing(&self, entity: &EntityRecord<S>, field: &str) -> bool {
        match field {
            "completed_at" => entity.completed_at.is_none(),
            "failed_at" => entity.failed_at.is_none(),
            "cancelled_at" => entity.cancelled_at.is_none(),
            _ => false,
        }
    }
}
