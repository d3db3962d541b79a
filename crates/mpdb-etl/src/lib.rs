//! Media plan reconciliation: reads a flat export, rebuilds the
//! account → campaign → strategy → line item → media buy hierarchy, and
//! loads one document per entity into a [`mpdb_db::DocumentStore`].

pub mod aggregate;
pub mod error;
pub mod identity;
pub mod index;
pub mod pipeline;
pub mod reader;
pub mod transform;

pub use error::{IdentityError, PipelineError, SourceError};
pub use identity::{document_key, IdentityResolver};
pub use pipeline::{
    AcceptAll, EntityReport, Pipeline, PipelineReport, RecordValidator, ReportSink, RunOptions,
    RunState, TracingSink,
};
pub use reader::{RecordReader, Row};
pub use transform::{Diagnostics, Transformer, WarningKind};
