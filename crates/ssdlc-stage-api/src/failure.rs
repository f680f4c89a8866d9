use thiserror::Error;

use ssdlc_llm::LlmError;
use ssdlc_utils::types::ErrorClass;

/// Why a stage handler produced no document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    /// Worth retrying; `class` picks the backoff.
    #[error("transient failure ({class}): {message}")]
    Transient { class: ErrorClass, message: String },

    /// Retrying the same input will not help.
    #[error("fatal failure: {message}")]
    Fatal { message: String },
}

impl StageFailure {
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Class seen by the retry coordinator; `Fatal` is `Unclassified`.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transient { class, .. } => *class,
            Self::Fatal { .. } => ErrorClass::Unclassified,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transient { message, .. } | Self::Fatal { message } => message,
        }
    }
}

impl From<LlmError> for StageFailure {
    fn from(err: LlmError) -> Self {
        let class = err.error_class();
        let message = err.to_string();
        if class.is_retryable() {
            Self::Transient { class, message }
        } else {
            Self::Fatal { message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_llm_error() {
        let failure: StageFailure = LlmError::ServiceUnavailable("busy".into()).into();
        assert_eq!(failure.class(), ErrorClass::ServiceUnavailable);

        let failure: StageFailure = LlmError::MalformedOutput("prose".into()).into();
        assert!(matches!(failure, StageFailure::Fatal { .. }));
        assert_eq!(failure.class(), ErrorClass::Unclassified);
    }

    #[test]
    fn test_quota_text_behind_client_error_stays_transient() {
        let err = LlmError::RateLimited {
            message: "gemini returned 400 Bad Request: RESOURCE_EXHAUSTED".into(),
            retry_after: Duration::from_secs(3),
        };
        let failure = StageFailure::from(err);
        assert_eq!(
            failure.class(),
            ErrorClass::RateLimited {
                retry_after: Duration::from_secs(3)
            }
        );
    }
}
