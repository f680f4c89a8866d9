//! Workflow-level guarantees exercised through the public orchestrator API.
//!
//! Stage handlers, the operator and the sleeper are scripted, so every test
//! is deterministic and runs without a network or real backoff.

mod test_support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use ssdlc::engine::test_support::{ScriptedHandler, scripted_handlers};
use ssdlc::{
    Document, DocumentSurface, EscalationDecision, MemorySurface, RouteTarget, Session, StageFailure, StageId,
    StageStatus, WorkflowError,
};
use ssdlc_stage_api::StageHandlers;
use ssdlc_utils::types::{CurrentStage, ErrorClass};
use test_support::{harness, test_policy, unavailable};

const START: &str = "create app for a neighbourhood bakery";

fn handlers_with(overrides: Vec<Arc<ScriptedHandler>>) -> StageHandlers {
    overrides
        .into_iter()
        .fold(scripted_handlers(), |handlers, h| handlers.with(h))
}

#[tokio::test]
async fn test_full_run_completes_every_stage_in_order() {
    let h = harness(scripted_handlers(), [], MemorySurface::new());
    let mut session = Session::new("full");

    let outcome = h
        .orchestrator
        .handle_turn(&mut session, START, &CancellationToken::new())
        .await
        .unwrap();

    let order: Vec<_> = outcome.stages.iter().map(|r| r.stage).collect();
    assert_eq!(order, StageId::ALL.to_vec());
    assert!(outcome.stages.iter().all(|r| r.status == StageStatus::Completed));
    assert!(session.state.completed.all_complete());
    assert!(!session.state.active_workflow);
    assert_eq!(session.state.current_stage, CurrentStage::Complete);
    assert_eq!(session.store.len(), 5);
    assert_eq!(h.surface.receipts().len(), 5);
    assert!(h.sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_completed_session_routes_to_complete() {
    let h = harness(scripted_handlers(), [], MemorySurface::new());
    let mut session = Session::new("again");
    let cancel = CancellationToken::new();
    h.orchestrator.handle_turn(&mut session, START, &cancel).await.unwrap();

    let outcome = h
        .orchestrator
        .handle_turn(&mut session, "build app please", &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.route, RouteTarget::Complete);
    assert!(outcome.stages.is_empty());
    assert!(!session.state.active_workflow);
    assert!(outcome.response.contains("workflow is complete"));
}

#[tokio::test]
async fn test_degraded_stage_advances_without_document() {
    let security = Arc::new(ScriptedHandler::always_failing(StageId::Security, unavailable()));
    let design = Arc::new(ScriptedHandler::succeeding(StageId::Design));
    let h = harness(
        handlers_with(vec![Arc::clone(&security), Arc::clone(&design)]),
        [EscalationDecision::Continue],
        MemorySurface::new(),
    );
    let mut session = Session::new("degrade");

    let outcome = h
        .orchestrator
        .handle_turn(&mut session, START, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(security.calls(), 3);
    let report = &outcome.stages[StageId::Security.index()];
    assert_eq!(report.status, StageStatus::Degraded);
    assert_eq!(report.last_error_class, Some(ErrorClass::ServiceUnavailable));
    assert!(session.state.completed.is_complete(StageId::Security));
    assert!(session.state.degraded.contains(&StageId::Security));
    assert!(!session.store.contains(StageId::Security.document_key()));
    assert!(!h.surface.exists(StageId::Security));

    // The next stage still runs and sees no security document.
    let seen = design.seen_keys();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains(&StageId::Environment.document_key().to_string()));
    assert!(!seen[0].contains(&StageId::Security.document_key().to_string()));
    assert!(outcome.response.contains("Security Requirements"));
}

#[tokio::test]
async fn test_retry_bound_and_monotonic_delays() {
    let environment = Arc::new(ScriptedHandler::always_failing(StageId::Environment, unavailable()));
    let h = harness(
        handlers_with(vec![Arc::clone(&environment)]),
        [EscalationDecision::Abort],
        MemorySurface::new(),
    );
    let mut session = Session::new("bound");

    let err = h
        .orchestrator
        .handle_turn(&mut session, START, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::StageAborted {
            stage: StageId::Environment,
            attempts: 3,
            ..
        }
    ));
    assert_eq!(environment.calls(), test_policy().max_attempts);

    let delays = h.sleeper.delays();
    assert_eq!(delays.len(), 2);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert!(delays.iter().all(|d| *d <= test_policy().max_delay));

    let escalations = h.escalator.requests();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].attempts, 3);
    assert!(!escalations[0].allow_wait_more);
}

#[tokio::test]
async fn test_abort_rolls_back_failing_stage_and_is_repeatable() {
    let environment = Arc::new(ScriptedHandler::new(
        StageId::Environment,
        [Err(StageFailure::fatal("schema mismatch"))],
        Ok(Document::new(json!({"platform": "web"}))),
    ));
    let h = harness(
        handlers_with(vec![Arc::clone(&environment)]),
        [EscalationDecision::Abort],
        MemorySurface::new(),
    );
    let mut session = Session::new("abort");
    let cancel = CancellationToken::new();

    let err = h.orchestrator.handle_turn(&mut session, START, &cancel).await;
    assert!(matches!(err, Err(WorkflowError::StageAborted { .. })));
    assert!(session.state.completed.is_complete(StageId::Interview));
    assert!(!session.state.completed.is_complete(StageId::Environment));
    // Same state the Environment stage was entered with.
    assert!(session.state.active_workflow);
    assert_eq!(session.state.current_stage, CurrentStage::Active(StageId::Environment));
    assert!(session.state.last_intent.is_none());
    assert!(session.state.validate().is_ok());

    let outcome = h
        .orchestrator
        .handle_turn(&mut session, "create app", &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.stages[0].stage, StageId::Environment);
    assert!(session.state.completed.all_complete());
}

#[tokio::test]
async fn test_cancelled_turn_leaves_session_unchanged() {
    let h = harness(scripted_handlers(), [], MemorySurface::new());
    let mut session = Session::new("cancel");
    let before = session.state.clone();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .orchestrator
        .handle_turn(&mut session, START, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Cancelled {
            stage: StageId::Interview,
            attempts: 0
        }
    ));
    assert_eq!(session.state, before);
    assert!(!session.state.active_workflow);
    assert_eq!(session.state.current_stage, CurrentStage::None);
    assert!(session.store.is_empty());
    assert!(h.surface.receipts().is_empty());
}

#[tokio::test]
async fn test_chat_turn_never_touches_stages() {
    let interview = Arc::new(ScriptedHandler::succeeding(StageId::Interview));
    let h = harness(
        handlers_with(vec![Arc::clone(&interview)]),
        [],
        MemorySurface::new(),
    );
    let mut session = Session::new("chat");

    let outcome = h
        .orchestrator
        .handle_turn(&mut session, "what can you do?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.route, RouteTarget::Chat);
    assert_eq!(interview.calls(), 0);
    assert_eq!(session.state.current_stage, CurrentStage::None);
    assert_eq!(session.state.last_response.as_deref(), Some(outcome.response.as_str()));
}

#[tokio::test]
async fn test_concurrent_sessions_share_one_orchestrator() {
    let h = harness(scripted_handlers(), [], MemorySurface::new());
    let orchestrator = Arc::new(h.orchestrator);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                let mut session = Session::new(format!("session-{i}"));
                orchestrator
                    .handle_turn(&mut session, START, &CancellationToken::new())
                    .await
                    .map(|_| session)
            })
        })
        .collect();

    for task in tasks {
        let session = task.await.unwrap().unwrap();
        assert!(session.state.completed.all_complete());
        assert_eq!(session.store.len(), 5);
    }
    assert_eq!(h.surface.receipts().len(), 8 * 5);
}

#[tokio::test]
async fn test_rate_limit_wait_more_gets_one_extra_attempt() {
    let rate_limited = StageFailure::Transient {
        class: ErrorClass::RateLimited {
            retry_after: Duration::from_secs(30),
        },
        message: "429 RESOURCE_EXHAUSTED".to_string(),
    };
    let interview = Arc::new(ScriptedHandler::new(
        StageId::Interview,
        [Err(rate_limited.clone()), Err(rate_limited.clone()), Err(rate_limited)],
        Ok(Document::new(json!({"users": ["baker"]}))),
    ));
    let h = harness(
        handlers_with(vec![Arc::clone(&interview)]),
        [EscalationDecision::WaitMore],
        MemorySurface::new(),
    );
    let mut session = Session::new("rate");

    let outcome = h
        .orchestrator
        .handle_turn(&mut session, START, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(interview.calls(), 4);
    assert_eq!(outcome.stages[0].attempts, 4);
    assert_eq!(outcome.stages[0].status, StageStatus::Completed);
    assert_eq!(
        h.sleeper.delays(),
        vec![
            Duration::from_secs(30),
            Duration::from_secs(30),
            test_policy().extra_wait
        ]
    );
    let escalations = h.escalator.requests();
    assert_eq!(escalations.len(), 1);
    assert!(escalations[0].allow_wait_more);
}
