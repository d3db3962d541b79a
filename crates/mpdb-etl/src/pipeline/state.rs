//! Per-entity run state machine.

use mpdb_core::EntityKind;
use serde::Serialize;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Reading,
    Indexing,
    Aggregating,
    Transforming,
    ResolvingIdentity,
    Loading,
    Done { with_errors: bool },
    Failed { reason: String },
}

impl RunState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done { .. } | RunState::Failed { .. })
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, RunState::Failed { .. })
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Reading => "reading",
            RunState::Indexing => "indexing",
            RunState::Aggregating => "aggregating",
            RunState::Transforming => "transforming",
            RunState::ResolvingIdentity => "resolving_identity",
            RunState::Loading => "loading",
            RunState::Done { with_errors: false } => "done",
            RunState::Done { with_errors: true } => "done_with_errors",
            RunState::Failed { .. } => "failed",
        }
    }
}

/// Whether `from → to` is a legal step.
///
/// `Aggregating` is skipped by entities without roll-ups and `Loading` by dry
/// runs. `Failed` is reachable from any non-terminal state, and dependency
/// failures fail a run straight from `Idle`.
fn is_allowed(from: &RunState, to: &RunState) -> bool {
    use RunState::{
        Aggregating, Done, Failed, Idle, Indexing, Loading, Reading, ResolvingIdentity,
        Transforming,
    };
    match (from, to) {
        (from, Failed { .. }) => !from.is_terminal(),
        (Idle, Reading)
        | (Reading, Indexing)
        | (Indexing, Aggregating | Transforming)
        | (Aggregating, Transforming)
        | (Transforming, ResolvingIdentity)
        | (ResolvingIdentity, Loading | Done { .. })
        | (Loading, Done { .. }) => true,
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct EntityRun {
    kind: EntityKind,
    state: RunState,
}

impl EntityRun {
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            state: RunState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Move to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTransition`] for an illegal step; the
    /// current state is left unchanged.
    pub fn advance(&mut self, to: RunState) -> Result<(), PipelineError> {
        if !is_allowed(&self.state, &to) {
            return Err(PipelineError::InvalidTransition {
                entity: self.kind,
                from: self.state.clone(),
                to,
            });
        }
        tracing::debug!(entity = %self.kind, from = self.state.label(), to = to.label(), "run state");
        self.state = to;
        Ok(())
    }

    /// Fail the run unless it already reached a terminal state.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        let reason = reason.into();
        tracing::error!(entity = %self.kind, from = self.state.label(), %reason, "entity run failed");
        self.state = RunState::Failed { reason };
    }

    #[must_use]
    pub fn into_state(self) -> RunState {
        self.state
    }
}
