//! Deterministic collaborators for exercising the workflow without a network,
//! a terminal or wall-clock sleeps.
//!
//! Not part of the stable API.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use ssdlc_llm::LlmError;
use ssdlc_stage_api::{
    Document, StageContext, StageFailure, StageHandler, StageHandlers, StageId,
};
use ssdlc_utils::types::ErrorClass;

use crate::intent::{IntentDecision, IntentModel, SessionSummary};
use crate::retry::{EscalationDecision, EscalationRequest, Escalator, Sleeper};

/// Records requested delays and returns at once.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(delay);
        }
        !cancel.is_cancelled()
    }
}

/// Owned copy of an [`EscalationRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEscalation {
    pub stage: StageId,
    pub class: ErrorClass,
    pub attempts: u32,
    pub allow_wait_more: bool,
}

/// Answers escalations from a fixed script; `Abort` once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedEscalator {
    script: Mutex<VecDeque<EscalationDecision>>,
    requests: Mutex<Vec<RecordedEscalation>>,
}

impl ScriptedEscalator {
    pub fn new(script: impl IntoIterator<Item = EscalationDecision>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `decision`.
    #[must_use]
    pub fn repeating(decision: EscalationDecision) -> Self {
        Self::new(std::iter::repeat_n(decision, 64))
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedEscalation> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Escalator for ScriptedEscalator {
    async fn escalate(
        &self,
        request: &EscalationRequest<'_>,
        _cancel: &CancellationToken,
    ) -> EscalationDecision {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedEscalation {
                stage: request.stage,
                class: request.class,
                attempts: request.attempts,
                allow_wait_more: request.allow_wait_more,
            });
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(EscalationDecision::Abort)
    }
}

/// Stage handler replaying scripted results, then a fallback result forever.
pub struct ScriptedHandler {
    stage: StageId,
    script: Mutex<VecDeque<Result<Document, StageFailure>>>,
    fallback: Result<Document, StageFailure>,
    calls: AtomicU32,
    seen_keys: Mutex<Vec<Vec<String>>>,
}

impl ScriptedHandler {
    pub fn new(
        stage: StageId,
        script: impl IntoIterator<Item = Result<Document, StageFailure>>,
        fallback: Result<Document, StageFailure>,
    ) -> Self {
        Self {
            stage,
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: AtomicU32::new(0),
            seen_keys: Mutex::new(Vec::new()),
        }
    }

    /// Always returns a small document naming the stage.
    #[must_use]
    pub fn succeeding(stage: StageId) -> Self {
        Self::new(stage, [], Ok(Document::new(json!({ "stage": stage.as_str() }))))
    }

    #[must_use]
    pub fn always_failing(stage: StageId, failure: StageFailure) -> Self {
        Self::new(stage, [], Err(failure))
    }

    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sorted document keys visible to each invocation.
    #[must_use]
    pub fn seen_keys(&self) -> Vec<Vec<String>> {
        self.seen_keys.lock().map(|k| k.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StageHandler for ScriptedHandler {
    fn stage(&self) -> StageId {
        self.stage
    }

    async fn invoke(&self, ctx: &StageContext<'_>) -> Result<Document, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut keys: Vec<String> = ctx.store.list().into_iter().map(String::from).collect();
        keys.sort();
        if let Ok(mut seen) = self.seen_keys.lock() {
            seen.push(keys);
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// A succeeding [`ScriptedHandler`] for every stage.
#[must_use]
pub fn scripted_handlers() -> StageHandlers {
    StageId::ALL
        .into_iter()
        .fold(StageHandlers::new(), |handlers, stage| {
            handlers.with(Arc::new(ScriptedHandler::succeeding(stage)))
        })
}

/// Intent model replaying scripted results, then failing.
pub struct ScriptedIntentModel {
    script: Mutex<VecDeque<Result<IntentDecision, LlmError>>>,
    exhausted: LlmError,
    calls: AtomicU32,
}

impl ScriptedIntentModel {
    pub fn new(script: impl IntoIterator<Item = Result<IntentDecision, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            exhausted: LlmError::Unsupported("intent script exhausted".to_string()),
            calls: AtomicU32::new(0),
        }
    }

    /// Fails every call with `error`.
    #[must_use]
    pub fn failing(error: LlmError) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            exhausted: error,
            calls: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentModel for ScriptedIntentModel {
    async fn classify(
        &self,
        _user_text: &str,
        _summary: &SessionSummary,
    ) -> Result<IntentDecision, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| Err(self.exhausted.clone()))
    }
}
