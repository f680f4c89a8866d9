//! LLM backend abstraction
//!
//! Every provider implements [`LlmBackend`]. Stage handlers and the intent
//! classifier only see the trait, so tests swap in scripted backends and the
//! CLI swaps in [`DryRunBackend`] for offline runs.

mod dry_run;
mod gemini_backend;
pub(crate) mod http_client;
mod json;
mod types;

use std::sync::Arc;

pub use dry_run::DryRunBackend;
pub use json::extract_json_object;
pub use ssdlc_utils::error::LlmError;
pub use types::{
    INTENT_PURPOSE, JSON_RESPONSE, LlmBackend, LlmInvocation, LlmResult, Message, Role,
};

use gemini_backend::GeminiBackend;
use ssdlc_config::{Config, LlmProvider};

/// Construct the backend selected by `llm.provider`.
///
/// # Errors
///
/// `LlmError::Misconfiguration` when the provider cannot be set up, e.g. a
/// missing API key.
pub fn from_config(config: &Config) -> Result<Arc<dyn LlmBackend>, LlmError> {
    match config.llm.provider {
        LlmProvider::Gemini => Ok(Arc::new(GeminiBackend::new_from_config(config)?)),
        LlmProvider::DryRun => Ok(Arc::new(DryRunBackend::new())),
    }
}
