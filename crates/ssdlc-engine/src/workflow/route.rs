use ssdlc_stage_api::StageId;

use super::session::SessionState;
use crate::intent::{IntentDecision, WorkflowAction};

/// Where a turn goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// Reply conversationally; stage progression untouched.
    Chat,
    /// Stop the active workflow; completion flags untouched.
    End,
    /// Run this stage.
    Stage(StageId),
    /// Every stage is complete.
    Complete,
}

/// Pure routing: the first incomplete stage in canonical order, or `Complete`.
#[must_use]
pub fn route(state: &SessionState, intent: &IntentDecision) -> RouteTarget {
    match intent.workflow_action {
        WorkflowAction::ChatMode => RouteTarget::Chat,
        WorkflowAction::End => RouteTarget::End,
        WorkflowAction::StartWorkflow | WorkflowAction::ContinueWorkflow => {
            match state.completed.first_incomplete() {
                Some(stage) => RouteTarget::Stage(stage),
                None => RouteTarget::Complete,
            }
        }
    }
}
