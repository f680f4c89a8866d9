//! LLM-backed stage handlers
//!
//! One [`LlmStageHandler`] per stage. Each builds a prompt from the stage's
//! [`StageProfile`], the documents it consumes and the user's message, calls
//! the backend once, and accepts only a JSON object as the stage document.
//!
//! A consumed document that is missing (its stage degraded) is named in the
//! prompt and the model is told to assume sensible defaults for it.
//!
//! The Generation document must also pass [`generation::validate_generation`]:
//! safe relative file paths and well-formed Mermaid diagrams.

pub mod generation;
mod profiles;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use profiles::StageProfile;

use ssdlc_config::Config;
use ssdlc_llm::{LlmBackend, LlmInvocation, Message, extract_json_object};
use ssdlc_stage_api::{
    Document, DocumentStore, StageContext, StageFailure, StageHandler, StageHandlers, StageId,
};

/// Stage handler that delegates to an [`LlmBackend`].
pub struct LlmStageHandler {
    profile: &'static StageProfile,
    backend: Arc<dyn LlmBackend>,
    model: String,
    timeout: Duration,
}

impl LlmStageHandler {
    #[must_use]
    pub fn new(
        stage: StageId,
        backend: Arc<dyn LlmBackend>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            profile: StageProfile::for_stage(stage),
            backend,
            model: model.into(),
            timeout,
        }
    }

    /// Messages sent to the backend for `ctx`.
    #[must_use]
    pub fn build_messages(&self, ctx: &StageContext<'_>) -> Vec<Message> {
        let system = format!(
            "You are {role}.\n\n{task}\n\n\
             Respond with a single JSON object and nothing else.",
            role = self.profile.role,
            task = self.profile.task,
        );

        let mut user = String::new();
        user.push_str("# User request\n\n");
        if ctx.user_context.trim().is_empty() {
            user.push_str("(no message from the user this turn)\n");
        } else {
            user.push_str(ctx.user_context.trim());
            user.push('\n');
        }
        if self.profile.stage == StageId::Interview && defers_to_assistant(ctx.user_context) {
            user.push_str(
                "\nThe user deferred these answers to you. Provide detailed professional \
                 defaults for every topic and list them under \"assumed_defaults\".\n",
            );
        }

        user.push_str("\n# Available documents\n\n");
        user.push_str(&available_documents(ctx.store));

        let (present, missing) = split_consumed(self.profile.consumes, ctx.store);
        for (stage, doc) in present {
            let body = doc
                .to_pretty_json()
                .unwrap_or_else(|_| doc.value().to_string());
            user.push_str(&format!("\n# {} ({})\n\n{body}\n", stage.title(), stage.document_key()));
        }
        if !missing.is_empty() {
            let names: Vec<_> = missing.iter().map(|s| s.document_key()).collect();
            user.push_str(&format!(
                "\n# Missing documents\n\nThe following documents are not available: {}. \
                 Assume sensible, standard defaults for the information they would contain.\n",
                names.join(", ")
            ));
        }

        vec![Message::system(system), Message::user(user)]
    }
}

/// Replies that hand the interview answers back to the assistant.
const DEFERRAL_REPLIES: &[&str] = &["pass", "ai", "i don't know", "i dont know", "idk", "skip"];

/// Whether `text` leaves the interview answers to the assistant.
#[must_use]
pub fn defers_to_assistant(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_end_matches(['.', '!'])
        .replace('\u{2019}', "'")
        .to_lowercase();
    normalized.is_empty() || DEFERRAL_REPLIES.contains(&normalized.as_str())
}

fn available_documents(store: &DocumentStore) -> String {
    let mut keys = store.list();
    if keys.is_empty() {
        return "(none)\n".to_string();
    }
    keys.sort_unstable();
    keys.iter().map(|k| format!("- {k}\n")).collect()
}

fn split_consumed<'s>(
    consumes: &[StageId],
    store: &'s DocumentStore,
) -> (Vec<(StageId, &'s Document)>, Vec<StageId>) {
    let mut present = Vec::new();
    let mut missing = Vec::new();
    for stage in consumes {
        match store.get(stage.document_key()) {
            Some(doc) => present.push((*stage, doc)),
            None => missing.push(*stage),
        }
    }
    (present, missing)
}

#[async_trait]
impl StageHandler for LlmStageHandler {
    fn stage(&self) -> StageId {
        self.profile.stage
    }

    async fn invoke(&self, ctx: &StageContext<'_>) -> Result<Document, StageFailure> {
        let messages = self.build_messages(ctx);
        let invocation = LlmInvocation::new(
            ctx.session_id,
            self.profile.stage.as_str(),
            self.model.clone(),
            self.timeout,
            messages,
        )
        .expecting_json()
        .with_metadata("attempt", serde_json::json!(ctx.attempt));

        let result = self.backend.invoke(invocation).await?;
        debug!(
            stage = %self.profile.stage,
            provider = %result.provider,
            response_len = result.raw_response.len(),
            "Stage handler received reply"
        );

        let object = extract_json_object(&result.raw_response).map_err(|e| {
            StageFailure::fatal(format!("{} stage: {e}", self.profile.stage.title()))
        })?;
        let document = Document::new(serde_json::Value::Object(object));
        if self.profile.stage == StageId::Generation {
            let files = generation::validate_generation(&document)
                .map_err(|e| StageFailure::fatal(format!("Generation stage: {e}")))?;
            debug!(files = files.len(), "Generation document lists files");
        }
        Ok(document)
    }
}

/// Handlers for every stage, sharing one backend.
#[must_use]
pub fn default_handlers(backend: Arc<dyn LlmBackend>, config: &Config) -> StageHandlers {
    StageId::ALL
        .into_iter()
        .fold(StageHandlers::new(), |handlers, stage| {
            handlers.with(Arc::new(LlmStageHandler::new(
                stage,
                Arc::clone(&backend),
                config.llm.model.clone(),
                config.llm.timeout(),
            )))
        })
}
