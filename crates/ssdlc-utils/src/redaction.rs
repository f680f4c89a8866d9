//! Redaction of provider error text before it reaches logs or the terminal.
//!
//! Gemini reports errors with the request URL attached, and that URL carries
//! the API key as a `key=` query parameter.

use once_cell::sync::Lazy;
use regex::Regex;

/// `scheme://user:pass@`
static URL_WITH_CREDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://)[^:@\s/]+:[^@\s]+@").expect("valid regex"));

/// `key=...` / `api_key=...` query parameters
static KEY_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([?&](?:api_?)?key=)[^&\s]+").expect("valid regex"));

/// Long alphanumeric runs that look like credentials
static POTENTIAL_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9_-]{32,}\b").expect("valid regex"));

/// Strip credentials from an error message while keeping its shape.
#[must_use]
pub fn redact_error_message(message: &str) -> String {
    let redacted = URL_WITH_CREDS.replace_all(message, "$1[REDACTED]@");
    let redacted = KEY_PARAM.replace_all(&redacted, "$1[REDACTED]");
    POTENTIAL_KEY
        .replace_all(&redacted, "[REDACTED_KEY]")
        .into_owned()
}
