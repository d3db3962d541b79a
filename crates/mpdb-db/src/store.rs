use std::collections::BTreeSet;
use std::future::Future;

use crate::document::{Document, WriteOutcome};
use crate::DbError;

/// A target that holds named document collections.
///
/// Stores are scoped to a namespace at construction; `collection` arguments
/// are bare names such as `"campaigns"`.
pub trait DocumentStore: Send + Sync {
    /// Insert-or-replace every document by key, in order.
    ///
    /// Returns one [`WriteOutcome`] per input document. A record the store
    /// refuses (e.g. a unique-constraint violation) is reported as
    /// [`WriteOutcome::Failed`] and does not stop the rest of the batch.
    ///
    /// # Errors
    ///
    /// `Err` means the store rejected the batch as a whole (connectivity loss,
    /// unwritable target); no outcome can be attributed to single records.
    fn upsert_batch(
        &self,
        collection: &str,
        docs: &[Document],
    ) -> impl Future<Output = Result<Vec<WriteOutcome>, DbError>> + Send;

    /// Remove every document in the collection; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the collection cannot be cleared.
    fn clear(&self, collection: &str) -> impl Future<Output = Result<u64, DbError>> + Send;

    /// # Errors
    ///
    /// Returns [`DbError`] if the collection cannot be read.
    fn count(&self, collection: &str) -> impl Future<Output = Result<u64, DbError>> + Send;

    /// Every document key currently stored in the collection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the collection cannot be read.
    fn keys(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<BTreeSet<String>, DbError>> + Send;

    /// Persist buffered writes for the collection. Stores that write through
    /// keep the default no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if buffered writes cannot be persisted.
    fn flush(&self, collection: &str) -> impl Future<Output = Result<(), DbError>> + Send {
        let _ = collection;
        async { Ok(()) }
    }
}
