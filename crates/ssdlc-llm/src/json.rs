//! Pulling a JSON object out of a model reply.
//!
//! Models wrap JSON in prose or in ```json fences; both are accepted.

use serde_json::{Map, Value};

use crate::LlmError;

/// First JSON object in `text`.
///
/// A fenced ```json block wins when present; otherwise the first `{` that
/// starts a complete object is used.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, LlmError> {
    if let Some(fenced) = fenced_block(text)
        && let Some(obj) = first_object(fenced)
    {
        return Ok(obj);
    }

    first_object(text).ok_or_else(|| {
        let preview: String = text.chars().take(120).collect();
        LlmError::MalformedOutput(format!("no JSON object found in reply: {preview}"))
    })
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip the info string (e.g. "json") up to the end of the line.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

fn first_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{').find_map(|(idx, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) => Some(map),
            _ => None,
        }
    })
}
