//! Documents handed to a [`crate::DocumentStore`] and the per-record outcome
//! of writing them.

use mpdb_core::DocumentKey;
use serde::Serialize;
use serde_json::Value;

use crate::DbError;

/// Field every stored body carries with its document key.
pub const KEY_FIELD: &str = "_key";

/// A transformed record ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: DocumentKey,
    /// Source business id the key was derived from; carried for failure reports.
    pub business_id: String,
    /// JSON object body, including [`KEY_FIELD`].
    pub body: Value,
}

impl Document {
    /// Serializes `record` into a document body and stamps it with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Json`] if the record cannot be serialized, or
    /// [`DbError::MalformedCollection`] if it does not serialize to an object.
    pub fn from_record<T: Serialize>(
        key: DocumentKey,
        business_id: impl Into<String>,
        record: &T,
    ) -> Result<Self, DbError> {
        let body = serde_json::to_value(record).map_err(|source| DbError::Json {
            context: format!("document {key}"),
            source,
        })?;
        Self::from_body(key, business_id, body)
    }

    /// Stamps an already-serialized body with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::MalformedCollection`] if `body` is not an object.
    pub fn from_body(
        key: DocumentKey,
        business_id: impl Into<String>,
        mut body: Value,
    ) -> Result<Self, DbError> {
        let Some(object) = body.as_object_mut() else {
            return Err(DbError::MalformedCollection {
                path: key.to_string(),
                reason: "record did not serialize to a JSON object".to_string(),
            });
        };
        object.insert(KEY_FIELD.to_string(), Value::String(key.to_string()));
        Ok(Self {
            key,
            business_id: business_id.into(),
            body,
        })
    }
}

/// Result of upserting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Failed { reason: String },
}
