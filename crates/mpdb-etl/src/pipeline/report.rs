//! Run summaries and the hooks that receive them.

use std::collections::BTreeMap;

use mpdb_core::EntityKind;
use mpdb_db::{Document, LoadReport, VerifyReport};
use serde::Serialize;

use super::state::RunState;
use crate::transform::{FieldWarning, WarningKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub entity: EntityKind,
    pub collection: &'static str,
    pub state: RunState,
    pub rows_read: usize,
    pub transformed: usize,
    /// Rows refused before loading: missing business id or validator veto.
    pub rejected: usize,
    pub rejection_reasons: Vec<String>,
    pub orphans: usize,
    pub duplicates: usize,
    /// Rows this entity rolls up from that name no parent, and so count
    /// toward none.
    pub unattributed: usize,
    pub warnings: BTreeMap<WarningKind, usize>,
    pub warning_samples: Vec<FieldWarning>,
    /// Auxiliary inputs that could not be read and were treated as empty.
    pub degraded_inputs: Vec<String>,
    pub load: Option<LoadReport>,
    pub verify: Option<VerifyReport>,
}

impl EntityReport {
    #[must_use]
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            collection: entity.collection(),
            state: RunState::Idle,
            rows_read: 0,
            transformed: 0,
            rejected: 0,
            rejection_reasons: Vec::new(),
            orphans: 0,
            duplicates: 0,
            unattributed: 0,
            warnings: BTreeMap::new(),
            warning_samples: Vec::new(),
            degraded_inputs: Vec::new(),
            load: None,
            verify: None,
        }
    }

    #[must_use]
    pub fn inserted(&self) -> usize {
        self.load.as_ref().map_or(0, LoadReport::inserted)
    }

    #[must_use]
    pub fn updated(&self) -> usize {
        self.load.as_ref().map_or(0, LoadReport::updated)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.load.as_ref().map_or(0, LoadReport::failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub namespace: String,
    pub dry_run: bool,
    pub entities: Vec<EntityReport>,
}

impl PipelineReport {
    #[must_use]
    pub fn entity(&self, kind: EntityKind) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.entity == kind)
    }

    pub fn failed_entities(&self) -> impl Iterator<Item = &EntityReport> {
        self.entities.iter().filter(|e| e.state.is_failed())
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed_entities().next().is_some()
    }

    /// Process exit status: non-zero when any entity type failed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.has_failures())
    }
}

/// Receives summaries as the run progresses. Formatting and delivery are
/// the sink's business.
pub trait ReportSink: Send + Sync {
    fn entity_finished(&self, report: &EntityReport);

    fn run_finished(&self, report: &PipelineReport) {
        let _ = report;
    }
}

/// Emits summaries as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn entity_finished(&self, report: &EntityReport) {
        let warnings: usize = report.warnings.values().sum();
        if let RunState::Failed { reason } = &report.state {
            tracing::error!(
                entity = %report.entity,
                rows_read = report.rows_read,
                %reason,
                "entity failed"
            );
            return;
        }
        tracing::info!(
            entity = %report.entity,
            state = report.state.label(),
            rows_read = report.rows_read,
            transformed = report.transformed,
            inserted = report.inserted(),
            updated = report.updated(),
            failed = report.failed(),
            rejected = report.rejected,
            orphans = report.orphans,
            duplicates = report.duplicates,
            warnings,
            "entity finished"
        );
    }

    fn run_finished(&self, report: &PipelineReport) {
        let failed: Vec<&str> = report.failed_entities().map(|e| e.entity.as_str()).collect();
        tracing::info!(
            namespace = %report.namespace,
            dry_run = report.dry_run,
            entities = report.entities.len(),
            failed = ?failed,
            "reconcile finished"
        );
    }
}

/// Predicate a document must pass before it is loaded.
pub trait RecordValidator: Send + Sync {
    /// # Errors
    ///
    /// Returns the rejection reason when `doc` must not be loaded.
    fn validate(&self, kind: EntityKind, doc: &Document) -> Result<(), String>;
}

/// Accepts every document.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl RecordValidator for AcceptAll {
    fn validate(&self, _kind: EntityKind, _doc: &Document) -> Result<(), String> {
        Ok(())
    }
}
