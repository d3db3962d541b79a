//! Batched, idempotent upserts into a [`DocumentStore`].
//!
//! Documents are written in fixed-size batches, sequentially. A record the
//! store refuses is counted and reasoned without stopping its batch; a batch
//! the store rejects outright is retried, then recorded, and later batches
//! still run. Cancellation is observed between batches only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mpdb_core::PipelineConfig;
use serde::Serialize;

use crate::document::{Document, WriteOutcome};
use crate::retry::retry_batch;
use crate::store::DocumentStore;
use crate::DbError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Insert-or-replace by key; documents not in this run are left alone.
    #[default]
    Upsert,
    /// Clear the collection, then upsert. Destructive; only on request.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub max_failure_reasons: usize,
    pub batch_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::from_pipeline_config(&PipelineConfig::default())
    }
}

impl LoaderConfig {
    #[must_use]
    pub fn from_pipeline_config(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_failure_reasons: config.max_failure_reasons,
            batch_retries: config.batch_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }
}

/// Operator abort request, shared between a signal handler and the loader.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFailure {
    pub key: String,
    pub business_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub index: usize,
    pub size: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    /// First failures in batch order, capped at the configured count.
    pub failures: Vec<WriteFailure>,
    /// Set when the store rejected the whole batch on every attempt.
    pub rejected: Option<String>,
    pub attempts: u32,
}

impl BatchReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.inserted + self.updated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub collection: String,
    pub mode: LoadMode,
    pub batches: Vec<BatchReport>,
    pub cleared: Option<u64>,
    pub aborted: bool,
    /// Documents never attempted because the load was aborted.
    pub skipped_records: usize,
    pub flush_error: Option<String>,
}

impl LoadReport {
    #[must_use]
    pub fn inserted(&self) -> usize {
        self.batches.iter().map(|b| b.inserted).sum()
    }

    #[must_use]
    pub fn updated(&self) -> usize {
        self.batches.iter().map(|b| b.updated).sum()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.batches.iter().map(|b| b.failed).sum()
    }

    #[must_use]
    pub fn rejected_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.rejected.is_some()).count()
    }

    /// All recorded failure reasons across batches, in batch order.
    pub fn failures(&self) -> impl Iterator<Item = &WriteFailure> {
        self.batches.iter().flat_map(|b| b.failures.iter())
    }

    /// `true` when a batch was rejected outright, the flush failed, or the
    /// load was aborted: conditions that leave the collection incomplete.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.rejected_batches() > 0 || self.flush_error.is_some() || self.aborted
    }
}

pub struct BatchLoader<'a, S: DocumentStore> {
    store: &'a S,
    config: LoaderConfig,
}

impl<'a, S: DocumentStore> BatchLoader<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, config: LoaderConfig) -> Self {
        Self { store, config }
    }

    /// Write `docs` into `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] only when `Replace` mode cannot clear the
    /// collection; nothing has been written in that case. Every other
    /// failure is recorded in the returned [`LoadReport`].
    pub async fn load(
        &self,
        collection: &str,
        docs: &[Document],
        mode: LoadMode,
        cancel: &CancelFlag,
    ) -> Result<LoadReport, DbError> {
        let mut report = LoadReport {
            collection: collection.to_string(),
            mode,
            ..LoadReport::default()
        };

        if mode == LoadMode::Replace {
            let cleared = self.store.clear(collection).await?;
            tracing::warn!(collection, cleared, "collection cleared for full replace");
            report.cleared = Some(cleared);
        }

        let mut written = 0usize;
        for (index, chunk) in docs.chunks(self.config.batch_size).enumerate() {
            if cancel.is_cancelled() {
                report.aborted = true;
                report.skipped_records = docs.len() - written;
                tracing::warn!(
                    collection,
                    batch = index,
                    skipped = report.skipped_records,
                    "load aborted at batch boundary"
                );
                break;
            }
            let batch = self.write_batch(collection, index, chunk).await;
            tracing::debug!(
                collection,
                batch = index,
                inserted = batch.inserted,
                updated = batch.updated,
                failed = batch.failed,
                "batch written"
            );
            written += chunk.len();
            report.batches.push(batch);
        }

        if let Err(e) = self.store.flush(collection).await {
            tracing::error!(collection, error = %e, "flush failed");
            report.flush_error = Some(e.to_string());
        }

        tracing::info!(
            collection,
            inserted = report.inserted(),
            updated = report.updated(),
            failed = report.failed(),
            rejected_batches = report.rejected_batches(),
            "load complete"
        );
        Ok(report)
    }

    async fn write_batch(&self, collection: &str, index: usize, chunk: &[Document]) -> BatchReport {
        let mut batch = BatchReport {
            index,
            size: chunk.len(),
            ..BatchReport::default()
        };
        let (result, attempts) = retry_batch(
            self.config.batch_retries,
            self.config.retry_backoff_ms,
            || self.store.upsert_batch(collection, chunk),
        )
        .await;
        batch.attempts = attempts;

        match result {
            Ok(outcomes) => {
                for (doc, outcome) in chunk.iter().zip(outcomes) {
                    match outcome {
                        WriteOutcome::Inserted => batch.inserted += 1,
                        WriteOutcome::Updated => batch.updated += 1,
                        WriteOutcome::Failed { reason } => {
                            batch.failed += 1;
                            tracing::warn!(
                                collection,
                                business_id = %doc.business_id,
                                %reason,
                                "record write failed"
                            );
                            self.note_failure(&mut batch, doc, reason);
                        }
                    }
                }
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(
                    collection,
                    batch = index,
                    attempts,
                    error = %reason,
                    "batch rejected by store"
                );
                batch.failed = chunk.len();
                for doc in chunk.iter().take(self.config.max_failure_reasons) {
                    self.note_failure(&mut batch, doc, reason.clone());
                }
                batch.rejected = Some(reason);
            }
        }
        batch
    }

    fn note_failure(&self, batch: &mut BatchReport, doc: &Document, reason: String) {
        if batch.failures.len() < self.config.max_failure_reasons {
            batch.failures.push(WriteFailure {
                key: doc.key.to_string(),
                business_id: doc.business_id.clone(),
                reason,
            });
        }
    }
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod tests;
