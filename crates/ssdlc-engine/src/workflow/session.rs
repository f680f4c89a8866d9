use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

use ssdlc_stage_api::{DocumentStore, StageId};
use ssdlc_utils::error::WorkflowError;
use ssdlc_utils::types::CurrentStage;

use crate::intent::{IntentDecision, SessionSummary};
use crate::persist::DocumentSurface;

/// Per-stage completion flags. Only ever move from `false` to `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionFlags([bool; 5]);

impl CompletionFlags {
    #[must_use]
    pub fn is_complete(&self, stage: StageId) -> bool {
        self.0[stage.index()]
    }

    /// Set the flag for `stage`. There is no way to clear it.
    pub fn mark(&mut self, stage: StageId) {
        self.0[stage.index()] = true;
    }

    #[must_use]
    pub fn all_complete(&self) -> bool {
        self.0.iter().all(|done| *done)
    }

    /// First incomplete stage in canonical order.
    #[must_use]
    pub fn first_incomplete(&self) -> Option<StageId> {
        StageId::ALL.into_iter().find(|s| !self.is_complete(*s))
    }

    #[must_use]
    pub fn completed(&self) -> Vec<StageId> {
        StageId::ALL
            .into_iter()
            .filter(|s| self.is_complete(*s))
            .collect()
    }
}

/// Workflow state of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub active_workflow: bool,
    pub current_stage: CurrentStage,
    pub completed: CompletionFlags,
    /// Stages marked complete without a document
    pub degraded: BTreeSet<StageId>,
    pub last_response: Option<String>,
    pub last_intent: Option<IntentDecision>,
}

impl SessionState {
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            active_workflow: self.active_workflow,
            current_stage: self.current_stage,
            completed: self.completed.completed(),
        }
    }

    /// Check that `current_stage` agrees with `completed`.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        match self.current_stage {
            CurrentStage::Active(stage) if self.completed.is_complete(stage) => {
                Err(WorkflowError::InvariantViolation(format!(
                    "current stage {stage} is already complete"
                )))
            }
            CurrentStage::Complete if !self.completed.all_complete() => {
                Err(WorkflowError::InvariantViolation(
                    "workflow marked complete with incomplete stages".to_string(),
                ))
            }
            _ => match self.degraded.iter().find(|s| !self.completed.is_complete(**s)) {
                Some(stage) => Err(WorkflowError::InvariantViolation(format!(
                    "stage {stage} degraded but not complete"
                ))),
                None => Ok(()),
            },
        }
    }

    /// Mark `stage` done and move `current_stage` past it.
    pub(crate) fn advance_past(&mut self, stage: StageId) {
        self.completed.mark(stage);
        self.current_stage = match self.completed.first_incomplete() {
            Some(next) => CurrentStage::Active(next),
            None => CurrentStage::Complete,
        };
    }
}

/// A conversation: its state and its documents. Owned by the caller.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub store: DocumentStore,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::default(),
            store: DocumentStore::new(),
        }
    }

    /// New session with persisted documents loaded and their stages marked complete.
    ///
    /// Generation output is never loaded. An unreadable document leaves its
    /// stage incomplete.
    pub fn resume_from(id: impl Into<String>, surface: &dyn DocumentSurface) -> Self {
        let mut session = Self::new(id);
        for stage in StageId::ALL.into_iter().filter(StageId::resumable) {
            if !surface.exists(stage) {
                continue;
            }
            match surface.read(stage) {
                Ok(Some(document)) => {
                    session.store.put(stage.document_key(), document);
                    session.state.completed.mark(stage);
                    info!(session_id = %session.id, stage = %stage, "Resumed stage from persisted document");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(session_id = %session.id, stage = %stage, error = %e, "Ignoring unreadable persisted document");
                }
            }
        }
        session
    }
}
