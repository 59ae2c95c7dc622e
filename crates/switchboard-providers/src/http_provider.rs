//! Generic HTTP-based LLM provider for OpenAI-compatible APIs.
//!
//! Talks directly to any `/chat/completions` endpoint: OpenAI, OpenRouter,
//! DeepSeek, Groq and self-hosted vLLM.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, error, warn};

use switchboard_core::types::{
    ChatCompletionRequest, ChatCompletionResponse, LlmResponse, Message, ResponseFormat,
    ToolDefinition,
};

use crate::registry::{resolve_model_name, ProviderConfig, ProviderSpec};
use crate::traits::{LlmProvider, LlmRequestConfig};

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// A generic LLM provider that talks to any OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    /// API key for Bearer authentication.
    api_key: String,
    /// Default model for this provider instance.
    default_model: String,
    /// Extra headers to send with each request (e.g. OpenRouter `HTTP-Referer`).
    extra_headers: HeaderMap,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .field("provider", &self.spec.display_name)
            .finish()
    }
}

impl HttpProvider {
    /// Create a new HttpProvider from a provider config and spec.
    ///
    /// # Arguments
    /// * `config`: User's config (api_key, api_base, extra_headers)
    /// * `spec`: Static provider spec from the registry
    /// * `model`: The default model to use
    pub fn new(config: &ProviderConfig, spec: &'static ProviderSpec, model: &str) -> Self {
        // Resolve API base: config > spec default > standard OpenAI path
        let api_base = config
            .api_base
            .clone()
            .or_else(|| spec.default_api_base.map(String::from))
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!("Invalid header: {}={}", key, value);
                }
            }
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        HttpProvider {
            client,
            api_base,
            api_key: config.api_key.clone(),
            default_model: model.to_string(),
            extra_headers,
            spec,
        }
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    fn resolve_model(&self, model: &str) -> String {
        resolve_model_name(model, self.spec)
    }
}

/// Why a completion call produced no usable response.
#[derive(Debug)]
enum CallError {
    /// Transport failure or unreadable body.
    Transport(String),
    /// Non-2xx status from the backend.
    Status(reqwest::StatusCode, String),
}

impl CallError {
    fn into_response(self) -> LlmResponse {
        match self {
            CallError::Transport(msg) => LlmResponse::error(msg),
            CallError::Status(status, body) => {
                LlmResponse::error(format!("Error calling LLM: {status} - {body}"))
            }
        }
    }
}

impl HttpProvider {
    fn request_body(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.resolve_model(model),
            messages: messages.to_vec(),
            tools: tools.map(<[ToolDefinition]>::to_vec),
            tool_choice: tools.map(|_| "auto".to_string()),
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
            response_format: config.json_output.then(ResponseFormat::json_object),
        }
    }

    async fn post(&self, body: &ChatCompletionRequest) -> Result<LlmResponse, CallError> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .headers(self.extra_headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| CallError::Transport(format!("Error calling LLM: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(CallError::Status(status, text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CallError::Transport(format!("Error parsing LLM response: {e}")))?;
        Ok(parsed.into())
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> LlmResponse {
        let mut body = self.request_body(messages, tools, model, config);
        debug!(
            provider = self.spec.display_name,
            model = %body.model,
            messages = messages.len(),
            tools = tools.map_or(0, |t| t.len()),
            json = config.json_output,
            "Calling LLM"
        );

        let mut result = self.post(&body).await;

        // Some self-hosted backends reject `response_format`; the prompt
        // still asks for JSON, so one plain retry is enough.
        if let Err(CallError::Status(reqwest::StatusCode::BAD_REQUEST, text)) = &result {
            if body.response_format.is_some() {
                warn!(
                    provider = self.spec.display_name,
                    body = %text,
                    "JSON mode rejected, retrying without response_format"
                );
                body.response_format = None;
                result = self.post(&body).await;
            }
        }

        match result {
            Ok(resp) => {
                debug!(
                    provider = self.spec.display_name,
                    has_content = resp.content.is_some(),
                    tool_calls = resp.tool_calls.len(),
                    finish_reason = resp.finish_reason.as_deref().unwrap_or("?"),
                    "LLM response received"
                );
                resp
            }
            Err(e) => {
                error!(provider = self.spec.display_name, error = ?e, "LLM call failed");
                e.into_response()
            }
        }
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        self.spec.display_name
    }
}

// ─────────────────────────────────────────────
// Builder (convenience)
// ─────────────────────────────────────────────

/// Build an HttpProvider from a model name and a map of provider configs.
///
/// Matches the model to a provider, reads its config, and creates the client.
pub fn create_provider(
    model: &str,
    providers: &std::collections::HashMap<String, ProviderConfig>,
) -> Result<HttpProvider, String> {
    let (config, spec) = crate::registry::match_provider(model, providers).ok_or_else(|| {
        format!(
            "No configured provider found for model '{}'. \
             Set the appropriate API key (e.g. SWITCHBOARD_PROVIDERS__OPENAI__API_KEY).",
            model
        )
    })?;

    debug!(
        provider = spec.display_name,
        model = model,
        api_base = config.api_base.as_deref().unwrap_or("default"),
        "Creating LLM provider"
    );

    Ok(HttpProvider::new(config, spec, model))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
