//! Shared setup for the workflow integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ssdlc::engine::test_support::{RecordingSleeper, ScriptedEscalator};
use ssdlc::{
    DocumentSurface, EscalationDecision, MemorySurface, Orchestrator, RetryPolicy, StageFailure,
};
use ssdlc_stage_api::StageHandlers;
use ssdlc_utils::types::ErrorClass;

/// Policy with the production shape: 3 attempts, 10s base, 60s cap, 5s jitter.
pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(10),
        max_delay: Duration::from_secs(60),
        max_jitter: Duration::from_secs(5),
        extra_wait: Duration::from_secs(120),
    }
}

pub fn unavailable() -> StageFailure {
    StageFailure::Transient {
        class: ErrorClass::ServiceUnavailable,
        message: "503 UNAVAILABLE: model overloaded".to_string(),
    }
}

/// Collaborators a test may want to inspect after the turn.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub sleeper: Arc<RecordingSleeper>,
    pub escalator: Arc<ScriptedEscalator>,
    pub surface: Arc<MemorySurface>,
}

/// Orchestrator over `handlers` with recorded sleeps and a scripted operator.
pub fn harness(
    handlers: StageHandlers,
    escalations: impl IntoIterator<Item = EscalationDecision>,
    surface: MemorySurface,
) -> Harness {
    let sleeper = Arc::new(RecordingSleeper::new());
    let escalator = Arc::new(ScriptedEscalator::new(escalations));
    let surface = Arc::new(surface);
    let orchestrator = Orchestrator::builder(handlers, Arc::clone(&surface) as Arc<dyn DocumentSurface>)
        .retry_policy(test_policy())
        .sleeper(Arc::clone(&sleeper) as _)
        .escalator(Arc::clone(&escalator) as _)
        .build()
        .unwrap();
    Harness {
        orchestrator,
        sleeper,
        escalator,
        surface,
    }
}
