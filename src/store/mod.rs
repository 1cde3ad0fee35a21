// Document store abstraction - the single seam between the engine and persistence.
//
// The engine never talks to a concrete database. Everything it needs is the
// small contract below: point reads, insert-if-absent, one atomic
// conditional-update primitive, and append-only writes for the transition log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryDocumentStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("document in {collection}/{key} is not valid for this engine: {detail}")]
    InvalidDocument {
        collection: String,
        key: String,
        detail: String,
    },
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A single field-level condition evaluated against a stored document.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Field is present, non-null, and equal to the given value.
    Equals { field: String, value: Value },
    /// Field is missing or null.
    Absent { field: String },
    /// Field holds an RFC3339 timestamp strictly before the given instant.
    /// A missing or unparseable field never satisfies this condition.
    Before {
        field: String,
        instant: DateTime<Utc>,
    },
}

impl Condition {
    pub fn holds(&self, doc: &Value) -> bool {
        match self {
            Condition::Equals { field, value } => {
                matches!(doc.get(field), Some(v) if v == value)
            }
            Condition::Absent { field } => {
                matches!(doc.get(field), None | Some(Value::Null))
            }
            Condition::Before { field, instant } => match doc.get(field) {
                Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
                    .map(|t| t.with_timezone(&Utc) < *instant)
                    .unwrap_or(false),
                _ => false,
            },
        }
    }
}

/// Predicate attached to a conditional update. `All(vec![])` is the
/// unconditional case: the update applies whenever the document exists.
#[derive(Debug, Clone)]
pub enum Predicate {
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Predicate {
    pub fn always() -> Self {
        Predicate::All(Vec::new())
    }

    pub fn holds(&self, doc: &Value) -> bool {
        match self {
            Predicate::All(conds) => conds.iter().all(|c| c.holds(doc)),
            Predicate::Any(conds) => conds.iter().any(|c| c.holds(doc)),
        }
    }
}

/// Transactional key-value/document store contract required by the engine.
///
/// `conditional_update` is the one atomicity primitive everything leans on:
/// the lease lock and every status write go through it. Patches merge into
/// the document at the top level; patching a field to `null` removes it,
/// which is how a lease release clears `lock_owner`/`lock_expires_at`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read. `Ok(None)` when the document does not exist.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Insert-if-absent. Returns `false` (and writes nothing) when a document
    /// already exists under the key.
    async fn insert_new(&self, collection: &str, key: &str, doc: Value)
        -> Result<bool, StoreError>;

    /// Atomically apply `patch` iff the predicate holds against the current
    /// document. Returns `false` when the document is missing or the
    /// predicate does not hold; the document is untouched in both cases.
    async fn conditional_update(
        &self,
        collection: &str,
        key: &str,
        predicate: &Predicate,
        patch: Value,
    ) -> Result<bool, StoreError>;

    /// Append-only insert, no key, no update-in-place. Used for the
    /// transition log.
    async fn append(&self, collection: &str, record: Value) -> Result<(), StoreError>;

    /// Secondary-index scan: all records whose `field` equals `value`.
    /// Callers order the results themselves.
    async fn find_by(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError>;
}

/// Merge `patch` into `doc` at the top level. `null` patch values delete.
pub(crate) fn apply_patch(doc: &mut Value, patch: Value) {
    let Value::Object(patch_map) = patch else {
        return;
    };
    if let Value::Object(doc_map) = doc {
        for (field, value) in patch_map {
            if value.is_null() {
                doc_map.remove(&field);
            } else {
                doc_map.insert(field, value);
            }
        }
    }
}
