//! Recoverable conditions found while transforming rows.

use std::collections::BTreeMap;

use mpdb_core::EntityKind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Financial or count field could not be parsed; zero substituted.
    UnparseableNumber,
    /// Date field could not be parsed; left unresolved.
    UnparseableDate,
    /// End date precedes start date.
    InvertedFlight,
    /// Status string not in the mapping table; `draft` substituted.
    UnknownStatus,
    /// Foreign key missing or not resolving to a known parent.
    OrphanRecord,
    /// A later row repeats an earlier row's business id.
    DuplicateBusinessId,
    /// Media buy linked to more than one line item; the first link is used.
    AmbiguousAssociation,
    /// A computed amount or total left the representable range; zero substituted.
    NumericOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldWarning {
    pub entity: EntityKind,
    pub business_id: String,
    pub field: String,
    pub kind: WarningKind,
    pub detail: String,
}

/// Per-entity accumulator. Every warning is counted; the first `keep` are
/// retained with detail for the report.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    entity: EntityKind,
    keep: usize,
    counts: BTreeMap<WarningKind, usize>,
    samples: Vec<FieldWarning>,
}

impl Diagnostics {
    #[must_use]
    pub fn new(entity: EntityKind, keep: usize) -> Self {
        Self {
            entity,
            keep,
            counts: BTreeMap::new(),
            samples: Vec::new(),
        }
    }

    pub fn warn(&mut self, business_id: &str, field: &str, kind: WarningKind, detail: String) {
        tracing::warn!(
            entity = %self.entity,
            business_id,
            field,
            kind = ?kind,
            %detail,
            "field warning"
        );
        *self.counts.entry(kind).or_default() += 1;
        if self.samples.len() < self.keep {
            self.samples.push(FieldWarning {
                entity: self.entity,
                business_id: business_id.to_string(),
                field: field.to_string(),
                kind,
                detail,
            });
        }
    }

    #[must_use]
    pub fn count(&self, kind: WarningKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    #[must_use]
    pub fn counts(&self) -> &BTreeMap<WarningKind, usize> {
        &self.counts
    }

    #[must_use]
    pub fn samples(&self) -> &[FieldWarning] {
        &self.samples
    }
}
