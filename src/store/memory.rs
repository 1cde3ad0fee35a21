// In-memory document store for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{apply_patch, DocumentStore, Predicate, StoreError};

/// `Mutex<HashMap>`-backed store. Keyed collections hold one document per
/// key; append collections are plain ordered vectors. Both live behind one
/// lock so a conditional update is atomic with respect to concurrent callers,
/// which is exactly the guarantee the engine asks of a real store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<HashMap<String, HashMap<String, Value>>>,
    appends: Mutex<HashMap<String, Vec<Value>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records appended to a collection (test utility).
    pub async fn appended_count(&self, collection: &str) -> usize {
        self.appends
            .lock()
            .await
            .get(collection)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let g = self.documents.lock().await;
        Ok(g.get(collection).and_then(|c| c.get(key)).cloned())
    }

    async fn insert_new(
        &self,
        collection: &str,
        key: &str,
        doc: Value,
    ) -> Result<bool, StoreError> {
        let mut g = self.documents.lock().await;
        let coll = g.entry(collection.to_string()).or_default();
        if coll.contains_key(key) {
            return Ok(false);
        }
        coll.insert(key.to_string(), doc);
        Ok(true)
    }

    async fn conditional_update(
        &self,
        collection: &str,
        key: &str,
        predicate: &Predicate,
        patch: Value,
    ) -> Result<bool, StoreError> {
        let mut g = self.documents.lock().await;
        let Some(doc) = g.get_mut(collection).and_then(|c| c.get_mut(key)) else {
            return Ok(false);
        };
        if !predicate.holds(doc) {
            return Ok(false);
        }
        apply_patch(doc, patch);
        Ok(true)
    }

    async fn append(&self, collection: &str, record: Value) -> Result<(), StoreError> {
        let mut g = self.appends.lock().await;
        g.entry(collection.to_string()).or_default().push(record);
        Ok(())
    }

    async fn find_by(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let g = self.appends.lock().await;
        Ok(g.get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
