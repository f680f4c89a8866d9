//! Intent classification for user turns
//!
//! [`IntentClassifier::classify`] is total: it asks an [`IntentModel`] first
//! and falls back to [`keyword_fallback`] when the model errors, times out,
//! returns something out of range, or is not configured at all.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use ssdlc_llm::{INTENT_PURPOSE, LlmBackend, LlmError, LlmInvocation, Message, extract_json_object};
use ssdlc_utils::redaction::redact_error_message;
use ssdlc_utils::types::{CurrentStage, StageId};

/// Confidence stamped on every keyword-fallback decision.
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    AppDevelopment,
    GeneralChat,
    Help,
    Status,
}

impl IntentType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AppDevelopment => "app_development",
            Self::GeneralChat => "general_chat",
            Self::Help => "help",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    StartWorkflow,
    ContinueWorkflow,
    ChatMode,
    End,
}

impl WorkflowAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StartWorkflow => "start_workflow",
            Self::ContinueWorkflow => "continue_workflow",
            Self::ChatMode => "chat_mode",
            Self::End => "end",
        }
    }

    /// Whether this action drives stage progression.
    #[must_use]
    pub const fn advances_workflow(&self) -> bool {
        matches!(self, Self::StartWorkflow | Self::ContinueWorkflow)
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured reading of one user message. Superseded each turn, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub intent_type: IntentType,
    pub confidence: f32,
    pub workflow_action: WorkflowAction,
    pub reasoning: String,
    #[serde(default)]
    pub app_type: Option<String>,
}

impl IntentDecision {
    /// Confidence is finite and within `[0, 1]`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }
}

/// What the classifier is told about the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub active_workflow: bool,
    pub current_stage: CurrentStage,
    pub completed: Vec<StageId>,
}

/// Primary classification path.
#[async_trait]
pub trait IntentModel: Send + Sync {
    async fn classify(
        &self,
        user_text: &str,
        summary: &SessionSummary,
    ) -> Result<IntentDecision, LlmError>;
}

const INTENT_INSTRUCTIONS: &str = "\
You classify messages sent to a secure software development assistant.

Intent types:
- app_development: the user wants to create, build or develop an application
- general_chat: ordinary conversation
- help: the user wants to know what the assistant can do
- status: the user asks about workflow progress

Workflow actions:
- start_workflow: begin a new application workflow
- continue_workflow: continue the active workflow
- chat_mode: answer conversationally
- end: stop the active workflow

Reply with one JSON object with the fields intent_type, confidence (0.0 to 1.0),
workflow_action, reasoning and app_type (string or null).";

/// [`IntentModel`] backed by an LLM call.
pub struct LlmIntentModel {
    backend: Arc<dyn LlmBackend>,
    model: String,
    timeout: Duration,
}

impl LlmIntentModel {
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            model: model.into(),
            timeout,
        }
    }

    fn prompt(user_text: &str, summary: &SessionSummary) -> String {
        let completed = if summary.completed.is_empty() {
            "none".to_string()
        } else {
            summary
                .completed
                .iter()
                .map(StageId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "User message: {user_text:?}\n\n\
             Workflow active: {}\n\
             Current stage: {}\n\
             Completed stages: {completed}",
            summary.active_workflow, summary.current_stage,
        )
    }
}

#[async_trait]
impl IntentModel for LlmIntentModel {
    async fn classify(
        &self,
        user_text: &str,
        summary: &SessionSummary,
    ) -> Result<IntentDecision, LlmError> {
        let invocation = LlmInvocation::new(
            "intent",
            INTENT_PURPOSE,
            self.model.clone(),
            self.timeout,
            vec![
                Message::system(INTENT_INSTRUCTIONS),
                Message::user(Self::prompt(user_text, summary)),
            ],
        )
        .expecting_json();

        let result = self.backend.invoke(invocation).await?;
        let object = extract_json_object(&result.raw_response)?;
        let decision: IntentDecision = serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| LlmError::MalformedOutput(format!("intent decision: {e}")))?;

        if !decision.is_well_formed() {
            return Err(LlmError::MalformedOutput(format!(
                "intent confidence out of range: {}",
                decision.confidence
            )));
        }
        Ok(decision)
    }
}

const APP_PHRASES: &[&str] = &[
    "make app",
    "create app",
    "build app",
    "develop app",
    "make application",
    "create application",
    "build application",
    "new app",
    "new application",
    "app development",
    "cashier app",
    "pos app",
    "inventory app",
    "management app",
];

const HELP_PHRASES: &[&str] = &["help", "what can you do", "commands", "how to"];

const STATUS_PHRASES: &[&str] = &["status", "progress", "where are we", "current stage"];

/// Deterministic phrase matching used when the model path is unavailable.
#[must_use]
pub fn keyword_fallback(user_text: &str, summary: &SessionSummary) -> IntentDecision {
    let text = user_text.trim().to_lowercase();
    let matches = |phrases: &[&str]| phrases.iter().any(|p| text.contains(p));

    let (intent_type, workflow_action, reasoning, app_type) = if matches(APP_PHRASES) {
        if summary.active_workflow {
            (
                IntentType::AppDevelopment,
                WorkflowAction::ContinueWorkflow,
                "app development requested while a workflow is active",
                None,
            )
        } else {
            (
                IntentType::AppDevelopment,
                WorkflowAction::StartWorkflow,
                "app development requested and no workflow is active",
                Some("general".to_string()),
            )
        }
    } else if matches(HELP_PHRASES) {
        (
            IntentType::Help,
            WorkflowAction::ChatMode,
            "user is asking for help",
            None,
        )
    } else if matches(STATUS_PHRASES) {
        (
            IntentType::Status,
            WorkflowAction::ChatMode,
            "user is asking for status",
            None,
        )
    } else {
        (
            IntentType::GeneralChat,
            WorkflowAction::ChatMode,
            "general conversation",
            None,
        )
    };

    IntentDecision {
        intent_type,
        confidence: FALLBACK_CONFIDENCE,
        workflow_action,
        reasoning: format!("Keyword fallback: {reasoning}"),
        app_type,
    }
}

/// Total classifier: model first, keywords otherwise.
#[derive(Clone)]
pub struct IntentClassifier {
    model: Option<Arc<dyn IntentModel>>,
    timeout: Duration,
}

impl IntentClassifier {
    #[must_use]
    pub fn new(model: Arc<dyn IntentModel>, timeout: Duration) -> Self {
        Self {
            model: Some(model),
            timeout,
        }
    }

    /// Classifier that never calls a model.
    #[must_use]
    pub fn keywords_only() -> Self {
        Self {
            model: None,
            timeout: Duration::ZERO,
        }
    }

    pub async fn classify(&self, user_text: &str, summary: &SessionSummary) -> IntentDecision {
        let Some(model) = &self.model else {
            return keyword_fallback(user_text, summary);
        };

        match tokio::time::timeout(self.timeout, model.classify(user_text, summary)).await {
            Ok(Ok(decision)) if decision.is_well_formed() => {
                debug!(
                    intent = %decision.intent_type,
                    action = %decision.workflow_action,
                    confidence = decision.confidence,
                    "Intent classified"
                );
                decision
            }
            Ok(Ok(decision)) => {
                warn!(
                    confidence = decision.confidence,
                    "Intent model returned an out-of-range confidence; using keyword fallback"
                );
                keyword_fallback(user_text, summary)
            }
            Ok(Err(e)) => {
                warn!(
                    error_class = e.error_class().label(),
                    error = %redact_error_message(&e.to_string()),
                    "Intent model failed; using keyword fallback"
                );
                keyword_fallback(user_text, summary)
            }
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "Intent model timed out; using keyword fallback"
                );
                keyword_fallback(user_text, summary)
            }
        }
    }
}

impl fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("model", &self.model.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
