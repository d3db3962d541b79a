//! Retry with back-off and jitter for whole-batch store rejections.
//!
//! Only batch-level [`DbError`]s reach this module; per-record refusals are
//! [`crate::WriteOutcome::Failed`] values and are never retried.

use std::future::Future;
use std::time::Duration;

use crate::DbError;

/// Returns `true` for errors a second attempt may get past.
///
/// Connectivity and I/O failures are retriable. Serialization problems and
/// malformed collection files are not: the same input fails the same way.
pub(crate) fn is_retriable(err: &DbError) -> bool {
    match err {
        DbError::Unavailable(_) | DbError::Io { .. } | DbError::Sqlx(_) => true,
        DbError::MissingDatabaseUrl
        | DbError::Json { .. }
        | DbError::MalformedCollection { .. }
        | DbError::Migration(_) => false,
    }
}

/// Runs `operation`, retrying up to `max_retries` more times on retriable errors.
///
/// Returns the final result together with the number of attempts made.
/// Delay doubles per attempt from `backoff_base_ms`, ±25 % jitter, capped at 30 s.
pub(crate) async fn retry_batch<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> (Result<T, DbError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    const MAX_DELAY_MS: u64 = 30_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return (Ok(value), attempt + 1),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return (Err(err), attempt + 1);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "batch rejected by store, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn json_err() -> DbError {
        DbError::Json {
            context: "test".to_owned(),
            source: serde_json::from_str::<()>("invalid").unwrap_err(),
        }
    }

    #[test]
    fn unavailable_is_retriable() {
        assert!(is_retriable(&DbError::Unavailable("down".to_owned())));
    }

    #[test]
    fn json_error_is_not_retriable() {
        assert!(!is_retriable(&json_err()));
    }

    #[test]
    fn malformed_collection_is_not_retriable() {
        assert!(!is_retriable(&DbError::MalformedCollection {
            path: "x".to_owned(),
            reason: "y".to_owned(),
        }));
    }

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = retry_batch(1, 0, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(DbError::Unavailable("blip".to_owned()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = retry_batch(1, 0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(DbError::Unavailable("down".to_owned())) }
        })
        .await;
        assert!(matches!(result, Err(DbError::Unavailable(_))));
        assert_eq!(attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retriable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = retry_batch(3, 0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(json_err()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
