//! Orchestration core for ssdlc
//!
//! - [`retry`]: bounded retry with classified backoff and operator escalation
//! - [`intent`]: total intent classifier with a keyword fallback
//! - [`workflow`]: per-session state machine driving the stage handlers
//! - [`persist`]: persisted document surface, resumption source and receipts
//! - [`chat`]: replies for turns that do not advance the workflow

pub mod chat;
pub mod intent;
pub mod persist;
pub mod retry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
pub mod workflow;

pub use intent::{
    FALLBACK_CONFIDENCE, IntentClassifier, IntentDecision, IntentModel, IntentType,
    LlmIntentModel, SessionSummary, WorkflowAction, keyword_fallback,
};
pub use persist::{DocumentSurface, FsDocumentSurface, MemorySurface, StageReceipt};
pub use retry::{
    EscalationDecision, EscalationRequest, Escalator, PolicyEscalator, RetryCoordinator,
    RetryOutcome, RetryPolicy, Sleeper, TokioSleeper,
};
pub use workflow::{
    CompletionFlags, Orchestrator, OrchestratorBuilder, RouteTarget, Session, SessionState,
    StageReport, StageStatus, TurnOutcome, route,
};
