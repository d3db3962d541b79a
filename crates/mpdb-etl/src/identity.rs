//! Stable document keys derived from business ids.
//!
//! A key is a UUIDv5 of `"<entity>/<business id>"` under a fixed namespace:
//! the same entity and business id always produce the same key, on any run,
//! on any host. There is no fallback that mints a key for a missing id.

use std::collections::{BTreeMap, HashMap};

use mpdb_core::{DocumentKey, EntityKind, EntityRef};
use uuid::Uuid;

use crate::error::IdentityError;

/// Namespace all document keys are derived under. Changing it re-keys every
/// collection.
const KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6d70_6462_2d64_6f63_2d6b_6579_2d76_3031);

/// Derive the document key for `business_id`.
///
/// Returns `None` for a blank id.
#[must_use]
pub fn document_key(kind: EntityKind, business_id: &str) -> Option<DocumentKey> {
    let id = business_id.trim();
    if id.is_empty() {
        return None;
    }
    let name = format!("{}/{id}", kind.as_str());
    Some(DocumentKey::new(
        Uuid::new_v5(&KEY_NAMESPACE, name.as_bytes()).to_string(),
    ))
}

/// Result of registering a business id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub key: DocumentKey,
    /// The id was already registered for this entity in this run.
    pub duplicate: bool,
}

/// Per-run business id → document key maps, one per entity kind.
///
/// Parents are registered before children are transformed, so child
/// references can be rewritten to keys before any document is written.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    maps: HashMap<EntityKind, BTreeMap<String, DocumentKey>>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `business_id` for `kind` and return its key.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::MissingBusinessId`] for a blank id.
    pub fn register(
        &mut self,
        kind: EntityKind,
        business_id: &str,
        row: usize,
    ) -> Result<Registration, IdentityError> {
        let key = document_key(kind, business_id).ok_or(IdentityError::MissingBusinessId {
            entity: kind,
            field: kind.business_id_field(),
            row,
        })?;
        let map = self.maps.entry(kind).or_default();
        let duplicate = map
            .insert(business_id.trim().to_string(), key.clone())
            .is_some();
        Ok(Registration { key, duplicate })
    }

    #[must_use]
    pub fn lookup(&self, kind: EntityKind, business_id: &str) -> Option<&DocumentKey> {
        self.maps.get(&kind)?.get(business_id.trim())
    }

    /// Reference to a `kind` document by business id.
    ///
    /// `None` when the row carried no id. A non-registered id still yields a
    /// reference, with `key: None`, so the raw value is preserved.
    #[must_use]
    pub fn reference(&self, kind: EntityKind, business_id: Option<&str>) -> Option<EntityRef> {
        let id = business_id?;
        Some(EntityRef {
            id: id.to_string(),
            key: self.lookup(kind, id).cloned(),
        })
    }

    /// Business id → key map for one entity kind, for the mapping file.
    #[must_use]
    pub fn snapshot(&self, kind: EntityKind) -> BTreeMap<String, String> {
        self.maps
            .get(&kind)
            .map(|map| {
                map.iter()
                    .map(|(id, key)| (id.clone(), key.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
