//! Error taxonomy for ssdlc.
//!
//! Library crates return the typed errors defined here; the binary folds them
//! into [`SsdlcError`] and renders them through [`UserFriendlyError`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;
use crate::types::{ErrorClass, StageId};

/// Server-suggested delay used when a rate-limit error carries no hint.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

static RETRY_DELAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']?retryDelay["']?\s*:\s*["']?(\d+)(?:\.\d+)?s"#).expect("valid regex")
});

/// Top-level error aggregating every subsystem.
#[derive(Error, Debug)]
pub enum SsdlcError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    StageExecution,
    LlmIntegration,
    FileSystem,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::StageExecution => write!(f, "Stage Execution"),
            Self::LlmIntegration => write!(f, "LLM Integration"),
            Self::FileSystem => write!(f, "File System"),
            Self::Internal => write!(f, "Internal"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::ValidationFailed { errors, .. } => format!(
                "Configuration validation failed with {} errors: {}",
                errors.len(),
                errors.join(", ")
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with optional [llm], [retry], [intent], [workflow] and [logging] sections."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has specific format requirements."
            )),
            Self::NotFound { .. } => None,
            Self::ValidationFailed { .. } => {
                Some("One or more configuration values are out of range.".to_string())
            }
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of .ssdlc/config.toml".to_string(),
                "Run 'ssdlc config' to see the effective configuration".to_string(),
            ],
            Self::InvalidValue { key, .. } => vec![format!(
                "Fix the value of '{key}' or remove it to fall back to the default"
            )],
            Self::NotFound { path } => vec![
                format!("Create the file at {path}"),
                "Or drop --config / SSDLC_CONFIG to use discovery and defaults".to_string(),
            ],
            Self::ValidationFailed { errors, .. } => errors
                .iter()
                .map(|e| format!("Fix: {e}"))
                .collect(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors raised by LLM backends.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Transport-level failure (connectivity, unexpected 4xx)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Duration,
    },

    /// Provider temporarily unavailable (503)
    #[error("Provider unavailable: {0}")]
    ServiceUnavailable(String),

    /// Other provider-side 5xx failure
    #[error("Provider internal error: {0}")]
    ProviderInternal(String),

    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Provider replied, but not in the expected shape
    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LlmError {
    /// Maps the error onto the retry taxonomy.
    ///
    /// Transport failures and timeouts are never retried automatically.
    #[must_use]
    pub fn error_class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { retry_after, .. } => ErrorClass::RateLimited {
                retry_after: *retry_after,
            },
            Self::ServiceUnavailable(_) => ErrorClass::ServiceUnavailable,
            Self::ProviderInternal(_) => ErrorClass::InternalTransient,
            Self::Transport(_)
            | Self::ProviderAuth(_)
            | Self::Timeout { .. }
            | Self::MalformedOutput(_)
            | Self::Misconfiguration(_)
            | Self::Unsupported(_) => ErrorClass::Unclassified,
        }
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::RateLimited {
                message,
                retry_after,
            } => format!(
                "LLM provider rate limit hit (retry after {}s): {message}",
                retry_after.as_secs()
            ),
            Self::ServiceUnavailable(msg) => format!("LLM provider is unavailable: {msg}"),
            Self::ProviderInternal(msg) => format!("LLM provider internal error: {msg}"),
            Self::Timeout { duration } => {
                format!("LLM invocation timed out after {duration:?}")
            }
            Self::MalformedOutput(msg) => format!("LLM returned malformed output: {msg}"),
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
            Self::Unsupported(msg) => format!("LLM feature not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::RateLimited { .. } => Some(
                "The provider throttles requests; the retry coordinator waits for the suggested delay."
                    .to_string(),
            ),
            Self::ServiceUnavailable(_) | Self::ProviderInternal(_) => {
                Some("Provider-side failures are usually transient.".to_string())
            }
            Self::ProviderAuth(_) | Self::Misconfiguration(_) => {
                Some("The LLM backend could not be configured or authenticated.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProviderAuth(_) => vec![
                "Check that the API key environment variable is set (default GOOGLE_API_KEY)"
                    .to_string(),
            ],
            Self::Misconfiguration(_) | Self::Unsupported(_) => vec![
                "Review the [llm] section of .ssdlc/config.toml".to_string(),
                "Use --dry-run to run the workflow without a provider".to_string(),
            ],
            Self::RateLimited { .. } => vec![
                "Wait a few minutes before retrying".to_string(),
                "Raise retry.max_attempts or choose 'wait' at the escalation prompt".to_string(),
            ],
            Self::Timeout { .. } => vec!["Increase llm.timeout_secs".to_string()],
            _ => vec!["Retry the turn; transient provider errors usually clear".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Misconfiguration(_) | Self::Unsupported(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::LlmIntegration,
        }
    }
}

/// Failures that surface from the workflow state machine to the session loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Stage {stage} aborted after {attempts} attempt(s): {reason}")]
    StageAborted {
        stage: StageId,
        class: Option<ErrorClass>,
        reason: String,
        attempts: u32,
    },

    #[error("Stage {stage} cancelled after {attempts} attempt(s)")]
    Cancelled { stage: StageId, attempts: u32 },

    #[error("Workflow invariant violated: {0}")]
    InvariantViolation(String),
}

impl WorkflowError {
    #[must_use]
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::StageAborted { stage, .. } | Self::Cancelled { stage, .. } => Some(*stage),
            Self::InvariantViolation(_) => None,
        }
    }
}

impl UserFriendlyError for WorkflowError {
    fn user_message(&self) -> String {
        match self {
            Self::StageAborted { stage, reason, .. } => {
                format!("The {} stage was aborted: {reason}", stage.title())
            }
            Self::Cancelled { stage, .. } => {
                format!("The {} stage was cancelled", stage.title())
            }
            Self::InvariantViolation(msg) => format!("Internal workflow error: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::StageAborted { .. } | Self::Cancelled { .. } => Some(
                "The stage was not marked complete; the session is still usable.".to_string(),
            ),
            Self::InvariantViolation(_) => Some("This indicates a defect in ssdlc.".to_string()),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::StageAborted { .. } | Self::Cancelled { .. } => {
                vec!["Send another message asking to continue the workflow".to_string()]
            }
            Self::InvariantViolation(_) => vec!["Please report this issue".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvariantViolation(_) => ErrorCategory::Internal,
            _ => ErrorCategory::StageExecution,
        }
    }
}

impl UserFriendlyError for SsdlcError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Llm(e) => e.user_message(),
            Self::Workflow(e) => e.user_message(),
            Self::Io(e) => format!("File system error: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Llm(e) => e.context(),
            Self::Workflow(e) => e.context(),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Llm(e) => e.suggestions(),
            Self::Workflow(e) => e.suggestions(),
            Self::Io(_) => vec!["Check permissions on the output directory".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Llm(e) => e.category(),
            Self::Workflow(e) => e.category(),
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl SsdlcError {
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Llm(LlmError::Misconfiguration(_) | LlmError::Unsupported(_)) => {
                ExitCode::CLI_ARGS
            }
            Self::Llm(_) => ExitCode::LLM_FAILURE,
            Self::Workflow(WorkflowError::InvariantViolation(_)) => ExitCode::INTERNAL,
            Self::Workflow(_) => ExitCode::STAGE_ABORTED,
            Self::Io(_) => ExitCode::INTERNAL,
        }
    }

    /// Multi-line rendering for the terminal.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = format!("[{}] {}", self.category(), self.user_message());
        if let Some(ctx) = self.context() {
            out.push_str(&format!("\n  {ctx}"));
        }
        for suggestion in self.suggestions() {
            out.push_str(&format!("\n  - {suggestion}"));
        }
        out
    }
}

/// Classifies free-form provider error text.
///
/// Quota exhaustion (`RESOURCE_EXHAUSTED` or `429`) becomes `RateLimited` with
/// the `retryDelay` hint when present, else [`DEFAULT_RATE_LIMIT_DELAY`].
#[must_use]
pub fn classify_error_text(text: &str) -> ErrorClass {
    if text.contains("RESOURCE_EXHAUSTED") || text.contains("429") {
        return ErrorClass::RateLimited {
            retry_after: parse_retry_delay(text).unwrap_or(DEFAULT_RATE_LIMIT_DELAY),
        };
    }
    if text.contains("503") || text.contains("UNAVAILABLE") {
        return ErrorClass::ServiceUnavailable;
    }
    if text.contains("500") || text.contains("INTERNAL") {
        return ErrorClass::InternalTransient;
    }
    ErrorClass::Unclassified
}

/// Extracts a `retryDelay: "NNs"` hint from provider error text.
#[must_use]
pub fn parse_retry_delay(text: &str) -> Option<Duration> {
    RETRY_DELAY
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Duration::from_secs)
}
