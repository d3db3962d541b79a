//! Post-load check that every expected document key landed in the store.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::store::DocumentStore;
use crate::DbError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub collection: String,
    pub expected: usize,
    pub found_total: u64,
    /// Expected keys absent from the store.
    pub missing: Vec<String>,
    /// Stored keys this run did not produce; left by earlier runs in upsert mode.
    pub extra: usize,
}

impl VerifyReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compare the store's keys for `collection` against `expected`.
///
/// # Errors
///
/// Returns [`DbError`] if the store cannot be read.
pub async fn verify_collection<S: DocumentStore>(
    store: &S,
    collection: &str,
    expected: &BTreeSet<String>,
) -> Result<VerifyReport, DbError> {
    let found = store.keys(collection).await?;
    let found_total = store.count(collection).await?;
    let missing: Vec<String> = expected.difference(&found).cloned().collect();
    let extra = found.difference(expected).count();

    if missing.is_empty() {
        tracing::info!(collection, expected = expected.len(), found_total, "verify ok");
    } else {
        tracing::warn!(
            collection,
            expected = expected.len(),
            missing = missing.len(),
            "verify found missing documents"
        );
    }
    Ok(VerifyReport {
        collection: collection.to_string(),
        expected: expected.len(),
        found_total,
        missing,
        extra,
    })
}
