//! Loads source export files into ordered, loosely-typed rows.

use std::path::{Path, PathBuf};

use mpdb_core::{SourceLayout, SourceSet};
use serde_json::{Map, Value};

use crate::error::SourceError;

/// One source record: field name to primitive or nested value.
pub type Row = Map<String, Value>;

/// Resolves source set names to files under one export directory.
#[derive(Debug, Clone)]
pub struct RecordReader {
    source_dir: PathBuf,
    layout: SourceLayout,
}

impl RecordReader {
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>, layout: SourceLayout) -> Self {
        Self {
            source_dir: source_dir.into(),
            layout,
        }
    }

    #[must_use]
    pub fn path_for(&self, set: SourceSet) -> PathBuf {
        self.source_dir.join(self.layout.file_name(set))
    }

    /// Read every row of `set` in file order.
    ///
    /// Optional sets with no file yield an empty sequence.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::SourceNotFound`] when a required file is absent,
    /// and [`SourceError::MalformedSource`] when the content is not a JSON
    /// array of objects.
    pub async fn read(&self, set: SourceSet) -> Result<Vec<Row>, SourceError> {
        let path = self.path_for(set);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if set.is_optional() {
                    tracing::debug!(set = %set, path = %path.display(), "optional source absent");
                    return Ok(Vec::new());
                }
                return Err(SourceError::SourceNotFound {
                    path: path.display().to_string(),
                });
            }
            Err(source) => {
                return Err(SourceError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let rows = parse_rows(&path, &raw)?;
        tracing::info!(set = %set, rows = rows.len(), "source read");
        Ok(rows)
    }
}

fn parse_rows(path: &Path, raw: &[u8]) -> Result<Vec<Row>, SourceError> {
    let malformed = |reason: String| SourceError::MalformedSource {
        path: path.display().to_string(),
        reason,
    };
    let value: Value = serde_json::from_slice(raw).map_err(|e| malformed(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(malformed("top-level value is not an array".to_string()));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Object(row) => Ok(row),
            other => Err(malformed(format!(
                "element {idx} is {} rather than an object",
                json_type(&other)
            ))),
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Text of a scalar field, trimmed; numbers are rendered as written.
/// Blank strings, nulls, and non-scalars read as absent.
#[must_use]
pub fn field_str(row: &Row, field: &str) -> Option<String> {
    value_str(row.get(field)?)
}

#[must_use]
pub fn value_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
