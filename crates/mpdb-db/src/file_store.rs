//! JSON-array-per-collection store.
//!
//! Each collection lives at `<root>/<collection>.json`. Existing files are read
//! lazily on first touch so documents from earlier runs survive an upsert run.
//! Writes are buffered in memory and persisted by [`DocumentStore::flush`].

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::document::{Document, WriteOutcome, KEY_FIELD};
use crate::store::DocumentStore;
use crate::DbError;

#[derive(Debug, Default)]
struct CachedCollection {
    docs: Vec<Value>,
    positions: HashMap<String, usize>,
    dirty: bool,
}

#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    collections: Mutex<HashMap<String, CachedCollection>>,
}

impl JsonFileStore {
    /// Store rooted at `output_dir/namespace`.
    #[must_use]
    pub fn new(output_dir: &Path, namespace: &str) -> Self {
        Self {
            root: output_dir.join(namespace),
            collections: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    async fn load(&self, collection: &str) -> Result<CachedCollection, DbError> {
        let path = self.collection_path(collection);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CachedCollection::default());
            }
            Err(source) => {
                return Err(DbError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let docs: Vec<Value> = serde_json::from_slice(&raw).map_err(|source| DbError::Json {
            context: path.display().to_string(),
            source,
        })?;

        let mut positions = HashMap::with_capacity(docs.len());
        for (idx, doc) in docs.iter().enumerate() {
            let Some(key) = doc.get(KEY_FIELD).and_then(Value::as_str) else {
                return Err(DbError::MalformedCollection {
                    path: path.display().to_string(),
                    reason: format!("element {idx} has no string '{KEY_FIELD}'"),
                });
            };
            positions.insert(key.to_string(), idx);
        }
        tracing::debug!(path = %path.display(), documents = docs.len(), "loaded collection file");
        Ok(CachedCollection {
            docs,
            positions,
            dirty: false,
        })
    }
}

/// Serialize `value` as pretty JSON and write it to `path` via a temp file
/// and rename, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`DbError::Json`] if serialization fails or [`DbError::Io`] if the
/// file cannot be written.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), DbError> {
    let io_err = |source| DbError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| DbError::Json {
        context: path.display().to_string(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

impl DocumentStore for JsonFileStore {
    async fn upsert_batch(
        &self,
        collection: &str,
        docs: &[Document],
    ) -> Result<Vec<WriteOutcome>, DbError> {
        let mut collections = self.collections.lock().await;
        if !collections.contains_key(collection) {
            let loaded = self.load(collection).await?;
            collections.insert(collection.to_string(), loaded);
        }
        let Some(cached) = collections.get_mut(collection) else {
            return Err(DbError::Unavailable(format!(
                "collection {collection} missing from cache"
            )));
        };

        let outcomes = docs
            .iter()
            .map(|doc| {
                if let Some(&idx) = cached.positions.get(doc.key.as_str()) {
                    cached.docs[idx] = doc.body.clone();
                    WriteOutcome::Updated
                } else {
                    cached
                        .positions
                        .insert(doc.key.to_string(), cached.docs.len());
                    cached.docs.push(doc.body.clone());
                    WriteOutcome::Inserted
                }
            })
            .collect();
        cached.dirty = true;
        Ok(outcomes)
    }

    async fn clear(&self, collection: &str) -> Result<u64, DbError> {
        let mut collections = self.collections.lock().await;
        let removed = match collections.get(collection) {
            Some(cached) => cached.docs.len(),
            None => self.load(collection).await?.docs.len(),
        };
        collections.insert(
            collection.to_string(),
            CachedCollection {
                dirty: true,
                ..CachedCollection::default()
            },
        );
        Ok(removed as u64)
    }

    async fn count(&self, collection: &str) -> Result<u64, DbError> {
        let collections = self.collections.lock().await;
        let len = match collections.get(collection) {
            Some(cached) => cached.docs.len(),
            None => self.load(collection).await?.docs.len(),
        };
        Ok(len as u64)
    }

    async fn keys(&self, collection: &str) -> Result<BTreeSet<String>, DbError> {
        let collections = self.collections.lock().await;
        let keys = match collections.get(collection) {
            Some(cached) => cached.positions.keys().cloned().collect(),
            None => self.load(collection).await?.positions.into_keys().collect(),
        };
        Ok(keys)
    }

    async fn flush(&self, collection: &str) -> Result<(), DbError> {
        let mut collections = self.collections.lock().await;
        let Some(cached) = collections.get_mut(collection) else {
            return Ok(());
        };
        if !cached.dirty {
            return Ok(());
        }
        let path = self.collection_path(collection);
        write_json_atomic(&path, &cached.docs).await?;
        cached.dirty = false;
        tracing::info!(path = %path.display(), documents = cached.docs.len(), "collection written");
        Ok(())
    }
}
