use mpdb_core::EntityKind;
use thiserror::Error;

use crate::pipeline::RunState;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source file not found: {path}")]
    SourceNotFound { path: String },

    #[error("failed to read source file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed source {path}: {reason}")]
    MalformedSource { path: String, reason: String },
}

impl SourceError {
    /// Both variants end the entity type's run; kept for log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::SourceNotFound { .. } => "source_not_found",
            SourceError::Io { .. } | SourceError::MalformedSource { .. } => "malformed_source",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("{entity} row {row} has no business id in '{field}'")]
    MissingBusinessId {
        entity: EntityKind,
        field: &'static str,
        row: usize,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] mpdb_db::DbError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("invalid run transition for {entity}: {from:?} -> {to:?}")]
    InvalidTransition {
        entity: EntityKind,
        from: RunState,
        to: RunState,
    },

    #[error("line item classifier rules failed to compile: {0}")]
    Classifier(#[from] regex::Error),

    #[error("{entity} skipped: dependency {dependency} failed")]
    DependencyFailed {
        entity: EntityKind,
        dependency: EntityKind,
    },

    #[error("{entity} load incomplete: {reason}")]
    LoadIncomplete { entity: EntityKind, reason: String },

    #[error("{entity} aborted by operator")]
    Aborted { entity: EntityKind },
}
