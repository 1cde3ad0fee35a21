// Append-only audit trail of transitions.
//
// The log is the source of truth for an entity's history; the entity
// document is a cached projection of it. Records are never mutated or
// deleted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::store::{DocumentStore, StoreError};

use super::types::{ActorType, EntityId, TransitionClass};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

/// One row per transition. `previous_state` is absent for the creation
/// record, so an entity's history is complete from birth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub execution_id: String,
    pub entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<String>,
    pub new_state: String,
    pub transition_class: TransitionClass,
    pub actor: Actor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl TransitionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entity_id: EntityId,
        previous_state: Option<&str>,
        new_state: &str,
        transition_class: TransitionClass,
        actor: Actor,
        reason: Option<String>,
        metadata: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            entity_id,
            previous_state: previous_state.map(str::to_string),
            new_state: new_state.to_string(),
            transition_class,
            actor,
            reason,
            metadata,
            created_at,
        }
    }
}

/// Writer/reader over one append-only transition collection. Appends need no
/// mutual exclusion: the collection is insert-only.
pub struct TransitionLog {
    store: Arc<dyn DocumentStore>,
    collection: &'static str,
}

impl TransitionLog {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &'static str) -> Self {
        Self { store, collection }
    }

    pub async fn record(&self, record: &TransitionRecord) -> Result<(), StoreError> {
        let doc = serde_json::to_value(record)?;
        self.store.append(self.collection, doc).await
    }

    /// Full history for one entity, oldest first.
    pub async fn history(&self, entity_id: &EntityId) -> Result<Vec<TransitionRecord>, StoreError> {
        let raw = self
            .store
            .find_by(
                self.collection,
                "entity_id",
                &Value::String(entity_id.as_str().to_string()),
            )
            .await?;
        let mut records = raw
            .into_iter()
            .map(serde_json::from_value::<TransitionRecord>)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
