//! Workflow state machine
//!
//! One call to [`Orchestrator::handle_turn`] processes one user message:
//! classify, route, then either reply in chat mode or run stages through the
//! retry coordinator. Stage progression is
//!
//! ```text
//! None → Interview → Environment → Security → Design → Generation → Complete
//! ```
//!
//! The orchestrator itself is immutable; all per-conversation state lives in
//! the caller's [`Session`], so many sessions can share one orchestrator.

mod route;
mod session;

use camino::Utf8PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, warn};

pub use route::{RouteTarget, route};
pub use session::{CompletionFlags, Session, SessionState};

use ssdlc_config::{Config, EscalationMode, LlmProvider, StepMode};
use ssdlc_llm::LlmBackend;
use ssdlc_stage_api::{Document, StageContext, StageHandlers, StageId};
use ssdlc_stages::generation::validate_generation;
use ssdlc_utils::error::WorkflowError;
use ssdlc_utils::logging::{log_stage_complete, log_stage_degraded, log_stage_start, stage_span};
use ssdlc_utils::types::{CurrentStage, ErrorClass};

use crate::chat::{COMPLETION_TEXT, chat_reply};
use crate::intent::{IntentClassifier, IntentDecision, LlmIntentModel};
use crate::persist::{DocumentSurface, StageReceipt};
use crate::retry::{
    EscalationDecision, Escalator, PolicyEscalator, RetryCoordinator, RetryPolicy, Sleeper,
    TokioSleeper,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    /// Marked complete without a document after the operator chose to continue
    Degraded,
}

/// What happened to one stage during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: StageId,
    pub status: StageStatus,
    pub attempts: u32,
    pub last_error_class: Option<ErrorClass>,
    /// Files materialized from the Generation document
    pub generated_files: Vec<Utf8PathBuf>,
}

/// Result of one user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub intent: IntentDecision,
    pub route: RouteTarget,
    /// Stages executed this turn, in order
    pub stages: Vec<StageReport>,
    pub response: String,
}

/// Drives sessions through the stage workflow.
pub struct Orchestrator {
    handlers: StageHandlers,
    classifier: IntentClassifier,
    policy: RetryPolicy,
    escalator: Arc<dyn Escalator>,
    sleeper: Arc<dyn Sleeper>,
    surface: Arc<dyn DocumentSurface>,
    step_mode: StepMode,
    write_receipts: bool,
}

/// Builder for [`Orchestrator`]. Defaults: keyword-only classifier, default
/// retry policy, abort on escalation, real sleeps, until-complete, receipts on.
pub struct OrchestratorBuilder {
    handlers: StageHandlers,
    surface: Arc<dyn DocumentSurface>,
    classifier: IntentClassifier,
    policy: RetryPolicy,
    escalator: Arc<dyn Escalator>,
    sleeper: Arc<dyn Sleeper>,
    step_mode: StepMode,
    write_receipts: bool,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn escalator(mut self, escalator: Arc<dyn Escalator>) -> Self {
        self.escalator = escalator;
        self
    }

    #[must_use]
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn step_mode(mut self, step_mode: StepMode) -> Self {
        self.step_mode = step_mode;
        self
    }

    #[must_use]
    pub fn write_receipts(mut self, enabled: bool) -> Self {
        self.write_receipts = enabled;
        self
    }

    /// Fails if any stage has no handler.
    pub fn build(self) -> Result<Orchestrator, WorkflowError> {
        let missing = self.handlers.missing();
        if !missing.is_empty() {
            let names: Vec<_> = missing.iter().map(StageId::as_str).collect();
            return Err(WorkflowError::InvariantViolation(format!(
                "no handler registered for: {}",
                names.join(", ")
            )));
        }
        Ok(Orchestrator {
            handlers: self.handlers,
            classifier: self.classifier,
            policy: self.policy,
            escalator: self.escalator,
            sleeper: self.sleeper,
            surface: self.surface,
            step_mode: self.step_mode,
            write_receipts: self.write_receipts,
        })
    }
}

impl Orchestrator {
    #[must_use]
    pub fn builder(handlers: StageHandlers, surface: Arc<dyn DocumentSurface>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            handlers,
            surface,
            classifier: IntentClassifier::keywords_only(),
            policy: RetryPolicy::default(),
            escalator: Arc::new(PolicyEscalator::new(EscalationDecision::Abort)),
            sleeper: Arc::new(TokioSleeper),
            step_mode: StepMode::default(),
            write_receipts: true,
        }
    }

    /// Wire an orchestrator from configuration.
    ///
    /// `prompt_escalator` answers escalations when the configured mode is
    /// `prompt`; the other modes use a fixed policy.
    pub fn from_config(
        config: &Config,
        backend: Arc<dyn LlmBackend>,
        prompt_escalator: Arc<dyn Escalator>,
        surface: Arc<dyn DocumentSurface>,
    ) -> Result<Self, WorkflowError> {
        let classifier = if config.intent.use_model && config.llm.provider != LlmProvider::DryRun {
            IntentClassifier::new(
                Arc::new(LlmIntentModel::new(
                    Arc::clone(&backend),
                    config.llm.model.clone(),
                    config.llm.timeout(),
                )),
                std::time::Duration::from_secs(config.intent.timeout_secs),
            )
        } else {
            IntentClassifier::keywords_only()
        };

        let escalator: Arc<dyn Escalator> = match config.workflow.escalation {
            EscalationMode::Prompt => prompt_escalator,
            EscalationMode::Continue => Arc::new(PolicyEscalator::new(EscalationDecision::Continue)),
            EscalationMode::Abort => Arc::new(PolicyEscalator::new(EscalationDecision::Abort)),
        };

        Self::builder(ssdlc_stages::default_handlers(backend, config), surface)
            .classifier(classifier)
            .retry_policy(RetryPolicy::from(&config.retry))
            .escalator(escalator)
            .step_mode(config.workflow.step_mode)
            .write_receipts(config.workflow.write_receipts)
            .build()
    }

    #[must_use]
    pub fn surface(&self) -> &dyn DocumentSurface {
        self.surface.as_ref()
    }

    /// Process one user message.
    ///
    /// An aborted or cancelled stage rolls the session back to the state it
    /// had before that stage was entered, so repeating the turn is safe. If
    /// the first stage of the turn fails the session is left untouched;
    /// stages finished earlier in the same turn keep their progress.
    pub async fn handle_turn(
        &self,
        session: &mut Session,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, WorkflowError> {
        session.state.validate()?;

        let intent = self
            .classifier
            .classify(user_text, &session.state.summary())
            .await;
        let target = route(&session.state, &intent);
        info!(
            session_id = %session.id,
            intent = %intent.intent_type,
            action = %intent.workflow_action,
            confidence = intent.confidence,
            route = ?target,
            "Routed turn"
        );

        let mut stages = Vec::new();
        let response = match target {
            RouteTarget::Chat => chat_reply(user_text, &session.state, &intent),
            RouteTarget::End => end_workflow(&mut session.state),
            RouteTarget::Complete => finish_workflow(&mut session.state),
            RouteTarget::Stage(first) => {
                let mut next = Some(first);
                while let Some(stage) = next {
                    let entered_from = (session.state.active_workflow, session.state.current_stage);
                    session.state.active_workflow = true;
                    session.state.current_stage = CurrentStage::Active(stage);
                    match self.run_stage(session, stage, user_text, cancel).await {
                        Ok(report) => stages.push(report),
                        Err(err) => {
                            (session.state.active_workflow, session.state.current_stage) =
                                entered_from;
                            return Err(err);
                        }
                    }
                    next = match self.step_mode {
                        StepMode::SingleStage => None,
                        StepMode::UntilComplete => session.state.completed.first_incomplete(),
                    };
                }

                if session.state.completed.all_complete() {
                    let mut text = progress_text(&stages, None);
                    text.push_str(&finish_workflow(&mut session.state));
                    text
                } else {
                    progress_text(&stages, session.state.current_stage.stage())
                }
            }
        };

        session.state.last_intent = Some(intent.clone());
        session.state.last_response = Some(response.clone());
        session.state.validate()?;

        Ok(TurnOutcome {
            intent,
            route: target,
            stages,
            response,
        })
    }

    async fn run_stage(
        &self,
        session: &mut Session,
        stage: StageId,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<StageReport, WorkflowError> {
        let handler = Arc::clone(self.handlers.get(stage).ok_or_else(|| {
            WorkflowError::InvariantViolation(format!("no handler registered for {stage}"))
        })?);
        let span = stage_span(&session.id, stage);

        async move {
            log_stage_start(&session.id, stage);
            let started = Instant::now();

            let coordinator =
                RetryCoordinator::new(&self.policy, self.sleeper.as_ref(), self.escalator.as_ref());
            let session_id = session.id.as_str();
            let store = &session.store;
            let outcome = coordinator
                .execute(stage, cancel, |attempt| {
                    let handler = Arc::clone(&handler);
                    async move {
                        let ctx = StageContext {
                            session_id,
                            stage,
                            user_context: user_text,
                            store,
                            attempt,
                        };
                        handler.invoke(&ctx).await
                    }
                })
                .await?;

            let attempts = outcome.attempts_used;
            let mut generated_files = Vec::new();
            let receipt = match outcome.value {
                Some(document) => {
                    if let Err(e) = self.surface.write(stage, &document) {
                        warn!(
                            session_id = %session.id,
                            stage = %stage,
                            error = %e,
                            "Failed to persist stage document; keeping it in memory"
                        );
                    }
                    if stage == StageId::Generation {
                        generated_files = self.materialize(&session.id, &document);
                    }
                    let receipt = StageReceipt::new(
                        &session.id,
                        stage,
                        Some(&document),
                        attempts,
                        outcome.last_error_class,
                    );
                    session.store.put(stage.document_key(), document);
                    session.state.advance_past(stage);
                    log_stage_complete(&session.id, stage, attempts, started.elapsed().as_millis());
                    receipt
                }
                None => {
                    let class = outcome.last_error_class.unwrap_or(ErrorClass::Unclassified);
                    session.state.advance_past(stage);
                    session.state.degraded.insert(stage);
                    log_stage_degraded(
                        &session.id,
                        stage,
                        class.label(),
                        "retries exhausted; continuing without document",
                    );
                    StageReceipt::new(&session.id, stage, None, attempts, Some(class))
                }
            };

            if self.write_receipts
                && let Err(e) = self.surface.record_receipt(&receipt)
            {
                warn!(session_id = %session.id, stage = %stage, error = %e, "Failed to write stage receipt");
            }

            Ok(StageReport {
                stage,
                status: if receipt.document_blake3.is_some() {
                    StageStatus::Completed
                } else {
                    StageStatus::Degraded
                },
                attempts,
                last_error_class: outcome.last_error_class,
                generated_files,
            })
        }
        .instrument(span)
        .await
    }

    /// Write the files a Generation document lists. Failures are logged; the
    /// document itself is already persisted.
    fn materialize(&self, session_id: &str, document: &Document) -> Vec<Utf8PathBuf> {
        let files = match validate_generation(document) {
            Ok(files) => files,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Generation document not materialized");
                return Vec::new();
            }
        };
        match self.surface.write_generated(&files) {
            Ok(written) => {
                info!(session_id = %session_id, files = written.len(), "Materialized generated files");
                written
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to write generated files");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("handlers", &self.handlers)
            .field("classifier", &self.classifier)
            .field("policy", &self.policy)
            .field("step_mode", &self.step_mode)
            .field("write_receipts", &self.write_receipts)
            .finish_non_exhaustive()
    }
}

fn end_workflow(state: &mut SessionState) -> String {
    if !state.active_workflow {
        return "There is no workflow running right now.".to_string();
    }
    state.active_workflow = false;
    "Workflow stopped. Completed stages are kept; tell me to continue whenever you're ready."
        .to_string()
}

fn finish_workflow(state: &mut SessionState) -> String {
    state.active_workflow = false;
    state.current_stage = CurrentStage::Complete;

    let mut text = COMPLETION_TEXT.to_string();
    if !state.degraded.is_empty() {
        let names: Vec<_> = state.degraded.iter().map(StageId::title).collect();
        text.push_str(&format!(
            "\nNote: these stages finished without a document and used defaults: {}.",
            names.join(", ")
        ));
    }
    text
}

fn progress_text(reports: &[StageReport], next: Option<StageId>) -> String {
    let mut text = String::new();
    for report in reports {
        match report.status {
            StageStatus::Completed => {
                text.push_str(&format!("Completed the {} stage.\n", report.stage.title()));
            }
            StageStatus::Degraded => text.push_str(&format!(
                "The {} stage could not be completed and was skipped; later stages will assume defaults.\n",
                report.stage.title()
            )),
        }
    }
    if let Some(next) = next {
        text.push_str(&format!(
            "Next up: {}. Say \"continue\" to proceed.",
            next.title()
        ));
    }
    text
}
