//! Shared HTTP client for HTTP-based LLM providers
//!
//! One `reqwest::Client` per backend, with a connect timeout and a
//! per-request timeout. No retries happen here: every non-success status is
//! mapped onto an [`LlmError`] whose class the retry coordinator acts on.

use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use ssdlc_utils::error::{
    DEFAULT_RATE_LIMIT_DELAY, LlmError, classify_error_text, parse_retry_delay,
};
use ssdlc_utils::redaction::redact_error_message;
use ssdlc_utils::types::ErrorClass;

/// Default maximum HTTP timeout (5 minutes)
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest slice of an error body carried into an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self, LlmError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
        })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send one request.
    ///
    /// The effective timeout is `min(request_timeout, max_timeout)`.
    pub async fn execute(
        &self,
        request_builder: reqwest::RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, LlmError> {
        let effective_timeout = request_timeout.min(self.max_timeout);

        let request = request_builder
            .timeout(effective_timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("Failed to build request: {e}")))?;

        debug!(
            provider = provider_name,
            timeout_secs = effective_timeout.as_secs(),
            "Executing HTTP request"
        );

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(LlmError::Timeout {
                    duration: effective_timeout,
                });
            }
            Err(e) => {
                return Err(LlmError::Transport(format!(
                    "{provider_name} request failed: {}",
                    redact_error_message(&e.to_string())
                )));
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_status_error(status, &body, provider_name))
    }
}

/// Map a non-success HTTP status (and its body) onto an [`LlmError`].
///
/// - 429 → `RateLimited` with the body's `retryDelay` hint
/// - 503 → `ServiceUnavailable`
/// - other 5xx → `ProviderInternal`
/// - 401/403 → `ProviderAuth`
/// - other 4xx → classified from the body text (quota exhaustion behind a 400
///   is still `RateLimited`), else `Transport`
pub(crate) fn map_status_error(status: StatusCode, body: &str, provider_name: &str) -> LlmError {
    let detail = redact_error_message(&truncate(body.trim(), MAX_ERROR_BODY_CHARS));
    let message = if detail.is_empty() {
        format!("{provider_name} returned {status}")
    } else {
        format!("{provider_name} returned {status}: {detail}")
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            retry_after: parse_retry_delay(body).unwrap_or(DEFAULT_RATE_LIMIT_DELAY),
            message,
        },
        StatusCode::SERVICE_UNAVAILABLE => LlmError::ServiceUnavailable(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::ProviderAuth(message),
        s if s.is_server_error() => LlmError::ProviderInternal(message),
        _ => match classify_error_text(body) {
            ErrorClass::RateLimited { retry_after } => LlmError::RateLimited {
                retry_after,
                message,
            },
            ErrorClass::ServiceUnavailable => LlmError::ServiceUnavailable(message),
            ErrorClass::InternalTransient => LlmError::ProviderInternal(message),
            ErrorClass::Unclassified => LlmError::Transport(message),
        },
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_429_carries_retry_delay() {
        let body = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"21s"}]}}"#;
        let err = map_status_error(StatusCode::TOO_MANY_REQUESTS, body, "gemini");
        assert_eq!(
            err.error_class(),
            ErrorClass::RateLimited {
                retry_after: Duration::from_secs(21)
            }
        );
    }

    #[test]
    fn test_429_without_hint_uses_default() {
        let err = map_status_error(StatusCode::TOO_MANY_REQUESTS, "", "gemini");
        assert_eq!(
            err.error_class(),
            ErrorClass::RateLimited {
                retry_after: DEFAULT_RATE_LIMIT_DELAY
            }
        );
    }

    #[test]
    fn test_server_errors() {
        assert_eq!(
            map_status_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded", "gemini").error_class(),
            ErrorClass::ServiceUnavailable
        );
        assert_eq!(
            map_status_error(StatusCode::INTERNAL_SERVER_ERROR, "", "gemini").error_class(),
            ErrorClass::InternalTransient
        );
        assert_eq!(
            map_status_error(StatusCode::BAD_GATEWAY, "", "gemini").error_class(),
            ErrorClass::InternalTransient
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(matches!(
            map_status_error(StatusCode::FORBIDDEN, "", "gemini"),
            LlmError::ProviderAuth(_)
        ));
        let err = map_status_error(StatusCode::BAD_REQUEST, "invalid argument", "gemini");
        assert!(matches!(err, LlmError::Transport(_)));
        assert_eq!(err.error_class(), ErrorClass::Unclassified);
    }

    #[test]
    fn test_client_error_body_with_quota_text_is_rate_limited() {
        let body = r#"{"error":{"code":400,"status":"RESOURCE_EXHAUSTED","details":[{"retryDelay":"7s"}]}}"#;
        let err = map_status_error(StatusCode::BAD_REQUEST, body, "gemini");
        assert!(matches!(err, LlmError::RateLimited { .. }));
        assert_eq!(
            err.error_class(),
            ErrorClass::RateLimited {
                retry_after: Duration::from_secs(7)
            }
        );

        let err = map_status_error(StatusCode::CONFLICT, "backend UNAVAILABLE", "gemini");
        assert_eq!(err.error_class(), ErrorClass::ServiceUnavailable);
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(600);
        let out = truncate(&body, 10);
        assert_eq!(out.chars().count(), 11);
    }
}
