//! Process-local document store.
//!
//! Backs dry runs and tests. Optional unique-field constraints behave like a
//! unique index on a document store: a second document carrying the same
//! value under a different key is refused.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;
use tokio::sync::Mutex;

use crate::document::{Document, WriteOutcome};
use crate::store::DocumentStore;
use crate::DbError;

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Value>>,
    unique_fields: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `field` unique across documents of `collection`.
    #[must_use]
    pub fn with_unique_field(mut self, collection: &str, field: &str) -> Self {
        self.state
            .get_mut()
            .unique_fields
            .entry(collection.to_string())
            .or_default()
            .push(field.to_string());
        self
    }

    /// Snapshot of a stored document body.
    pub async fn get(&self, collection: &str, key: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned()
    }
}

fn unique_violation(
    docs: &BTreeMap<String, Value>,
    fields: &[String],
    doc: &Document,
) -> Option<String> {
    for field in fields {
        let Some(value) = doc.body.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let clash = docs
            .iter()
            .find(|(key, existing)| *key != doc.key.as_str() && existing.get(field) == Some(value));
        if let Some((other_key, _)) = clash {
            return Some(format!(
                "duplicate value {value} for unique field '{field}' (held by {other_key})"
            ));
        }
    }
    None
}

impl DocumentStore for MemoryStore {
    async fn upsert_batch(
        &self,
        collection: &str,
        docs: &[Document],
    ) -> Result<Vec<WriteOutcome>, DbError> {
        let mut state = self.state.lock().await;
        let MemoryState {
            collections,
            unique_fields,
        } = &mut *state;
        let fields = unique_fields.get(collection).cloned().unwrap_or_default();
        let stored = collections.entry(collection.to_string()).or_default();

        let outcomes = docs
            .iter()
            .map(|doc| {
                if let Some(reason) = unique_violation(stored, &fields, doc) {
                    return WriteOutcome::Failed { reason };
                }
                match stored.insert(doc.key.to_string(), doc.body.clone()) {
                    Some(_) => WriteOutcome::Updated,
                    None => WriteOutcome::Inserted,
                }
            })
            .collect();
        Ok(outcomes)
    }

    async fn clear(&self, collection: &str) -> Result<u64, DbError> {
        let mut state = self.state.lock().await;
        let removed = state
            .collections
            .remove(collection)
            .map_or(0, |docs| docs.len());
        Ok(removed as u64)
    }

    async fn count(&self, collection: &str) -> Result<u64, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .collections
            .get(collection)
            .map_or(0, |docs| docs.len() as u64))
    }

    async fn keys(&self, collection: &str) -> Result<BTreeSet<String>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .collections
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }
}
