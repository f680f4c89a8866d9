//! Gemini HTTP backend (`models/{model}:generateContent`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::LlmError;
use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Role};
use ssdlc_config::Config;

const PROVIDER: &str = "gemini";

#[derive(Clone)]
pub(crate) struct GeminiBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
    temperature: f32,
}

impl GeminiBackend {
    pub fn new(
        api_key: String,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
        client: HttpClient,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
            temperature: 0.2,
        }
    }

    /// Build the backend from `[llm]`.
    ///
    /// # Errors
    ///
    /// `LlmError::Misconfiguration` when the API key variable is unset or the
    /// HTTP client cannot be built.
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let api_key_env = config.llm.api_key_env.as_str();
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Misconfiguration(format!(
                    "Gemini API key not found in environment variable '{api_key_env}'. \
                     Set it, configure a different llm.api_key_env, or run with --dry-run."
                ))
            })?;

        let client = HttpClient::with_max_timeout(config.llm.timeout())?;
        Ok(Self::new(
            api_key,
            config.llm.base_url.clone(),
            config.llm.model.clone(),
            client,
        ))
    }

    fn resolve_model<'a>(&'a self, inv: &'a LlmInvocation) -> &'a str {
        if inv.model.is_empty() {
            &self.default_model
        } else {
            &inv.model
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    fn build_request(&self, inv: &LlmInvocation) -> GenerateContentRequest {
        let system_text: Vec<&str> = inv
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let system_instruction = (!system_text.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: system_text.join("\n\n"),
            }],
        });

        let contents = inv
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let temperature = inv
            .metadata
            .get("temperature")
            .and_then(serde_json::Value::as_f64)
            .map_or(self.temperature, |t| t as f32);

        GenerateContentRequest {
            system_instruction,
            contents,
            generation_config: GenerationConfig {
                temperature,
                response_mime_type: inv.wants_json().then(|| "application/json".to_string()),
            },
        }
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let model = self.resolve_model(&inv).to_string();

        debug!(
            provider = PROVIDER,
            model = %model,
            purpose = %inv.purpose,
            session_id = %inv.session_id,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Gemini backend"
        );

        let body = self.build_request(&inv);
        let request = self
            .client
            .inner()
            .post(self.endpoint(&model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        let response = self.client.execute(request, inv.timeout, PROVIDER).await?;

        let response_body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedOutput(format!("Failed to parse Gemini response: {e}")))?;

        let text = response_body.text().ok_or_else(|| {
            LlmError::MalformedOutput(format!(
                "Gemini response has no text candidate (finish reason: {})",
                response_body.finish_reason().unwrap_or("unknown")
            ))
        })?;

        let mut result = LlmResult::new(text, PROVIDER, model);
        if let Some(reason) = response_body.finish_reason() {
            result = result.with_extension(
                "finish_reason",
                serde_json::Value::String(reason.to_string()),
            );
        }
        if let Some(usage) = response_body.usage_metadata {
            result = result.with_tokens(
                usage.prompt_token_count.unwrap_or(0),
                usage.candidates_token_count.unwrap_or(0),
            );
        }

        debug!(
            provider = PROVIDER,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Gemini invocation completed"
        );

        Ok(result)
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        (!text.trim().is_empty()).then_some(text)
    }

    fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}
