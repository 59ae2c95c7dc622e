//! LLM Provider trait: the seam between the network and any chat backend.
//!
//! The `HttpProvider` in `http_provider.rs` covers all OpenAI-compatible APIs;
//! tests substitute scripted providers.

use async_trait::async_trait;
use switchboard_core::types::{LlmResponse, Message, ToolDefinition};

/// Configuration passed to each LLM call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Ask the backend for a single JSON object (`response_format`).
    pub json_output: bool,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
            json_output: false,
        }
    }
}

impl LlmRequestConfig {
    /// Deterministic JSON-mode settings used by the routing oracles.
    pub fn structured(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            temperature: 0.0,
            json_output: true,
        }
    }
}

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// # Arguments
    /// * `messages`: Conversation history in OpenAI format.
    /// * `tools`: Optional list of tool definitions the LLM can call.
    /// * `model`: Model identifier (e.g. `"gpt-4o-mini"`).
    /// * `config`: Temperature, max_tokens, JSON mode.
    ///
    /// # Returns
    /// An `LlmResponse` with content and/or tool calls.
    /// On API errors, returns `LlmResponse::error(...)` instead of propagating.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> LlmResponse;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
