//! Postgres-backed document store over the `documents` table.

use std::collections::BTreeSet;

use sqlx::{Acquire, PgPool};

use crate::document::{Document, WriteOutcome};
use crate::store::DocumentStore;
use crate::DbError;

#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    namespace: String,
}

impl PgDocumentStore {
    #[must_use]
    pub fn new(pool: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Errors that say nothing about the record being written: the connection or
/// pool is gone, so the whole batch is rejected instead.
fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_)
    )
}

impl DocumentStore for PgDocumentStore {
    async fn upsert_batch(
        &self,
        collection: &str,
        docs: &[Document],
    ) -> Result<Vec<WriteOutcome>, DbError> {
        // The batch commits as a whole, so a retried batch never finds half of
        // itself already written. Each record runs under its own savepoint so
        // a constraint violation is attributed to that record alone.
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(docs.len());
        for doc in docs {
            let mut savepoint = tx.begin().await?;
            let result = sqlx::query_scalar::<_, bool>(
                "INSERT INTO documents (namespace, collection, doc_key, business_id, body) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (namespace, collection, doc_key) DO UPDATE SET \
                     business_id = EXCLUDED.business_id, \
                     body        = EXCLUDED.body, \
                     updated_at  = NOW() \
                 RETURNING (xmax = 0) AS is_new",
            )
            .bind(&self.namespace)
            .bind(collection)
            .bind(doc.key.as_str())
            .bind(&doc.business_id)
            .bind(&doc.body)
            .fetch_one(&mut *savepoint)
            .await;

            match result {
                Ok(is_new) => {
                    savepoint.commit().await?;
                    outcomes.push(if is_new {
                        WriteOutcome::Inserted
                    } else {
                        WriteOutcome::Updated
                    });
                }
                Err(err) if is_connection_error(&err) => return Err(DbError::Sqlx(err)),
                Err(err) => {
                    savepoint.rollback().await?;
                    outcomes.push(WriteOutcome::Failed {
                        reason: err.to_string(),
                    });
                }
            }
        }
        tx.commit().await?;
        Ok(outcomes)
    }

    async fn clear(&self, collection: &str) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM documents WHERE namespace = $1 AND collection = $2")
            .bind(&self.namespace)
            .bind(collection)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self, collection: &str) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE namespace = $1 AND collection = $2",
        )
        .bind(&self.namespace)
        .bind(collection)
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn keys(&self, collection: &str) -> Result<BTreeSet<String>, DbError> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT doc_key FROM documents WHERE namespace = $1 AND collection = $2",
        )
        .bind(&self.namespace)
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys.into_iter().collect())
    }
}
