//! LLM agent: an `agent` resource that runs the LLM ↔ tool-calling loop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use switchboard_core::types::{Message, ToolCall};
use switchboard_core::utils::today_date;
use switchboard_providers::{LlmProvider, LlmRequestConfig};

use crate::resource::{Invocable, InvocationContext, RegisteredResource, ResourceDescriptor, ResourceOutput};
use crate::tools::ToolRegistry;

/// Default maximum LLM ↔ tool iterations per invocation.
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;

const NO_RESPONSE: &str = "I've completed processing but have no response to give.";

pub struct LlmAgent {
    name: String,
    description: String,
    instructions: String,
    model: String,
    provider: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    request_config: LlmRequestConfig,
    max_tool_iterations: usize,
}

impl LlmAgent {
    /// Create an agent; `model` falls back to the provider default.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        model: Option<String>,
    ) -> Self {
        let model = model.unwrap_or_else(|| provider.default_model().to_string());
        Self {
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            model,
            provider,
            tools: ToolRegistry::new(),
            request_config: LlmRequestConfig::default(),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_request_config(mut self, config: LlmRequestConfig) -> Self {
        self.request_config = config;
        self
    }

    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Registry entry for this agent.
    pub fn into_resource(self) -> RegisteredResource {
        let descriptor = ResourceDescriptor::agent(&self.name, &self.description);
        RegisteredResource::new(descriptor, Arc::new(self))
    }

    fn system_prompt(&self) -> String {
        format!("{}\n\nToday's date: {}", self.instructions, today_date())
    }

    /// Answer one prompt, calling tools as the model requests.
    pub async fn respond(&self, prompt: &str) -> anyhow::Result<String> {
        let mut messages = vec![Message::system(self.system_prompt()), Message::user(prompt)];
        let tool_defs = self.tools.get_definitions();
        let tools = (!tool_defs.is_empty()).then_some(tool_defs.as_slice());

        for iteration in 0..self.max_tool_iterations {
            debug!(agent = %self.name, iteration, "LLM call");

            let response = self
                .provider
                .chat(&messages, tools, &self.model, &self.request_config)
                .await;

            if response.is_error() {
                anyhow::bail!(
                    "{} call failed: {}",
                    self.provider.display_name(),
                    response.content.unwrap_or_default()
                );
            }

            if !response.has_tool_calls() {
                return Ok(response.content.unwrap_or_default());
            }

            let tool_calls: Vec<ToolCall> = response.tool_calls.clone();
            messages.push(Message::assistant_tool_calls(
                response.content.clone(),
                tool_calls.clone(),
            ));

            for tc in &tool_calls {
                let params: HashMap<String, serde_json::Value> =
                    serde_json::from_str(&tc.function.arguments).unwrap_or_default();

                info!(
                    agent = %self.name,
                    tool = %tc.function.name,
                    iteration,
                    "executing tool call"
                );
                let result = self.tools.execute(&tc.function.name, params).await;
                debug!(tool = %tc.function.name, result_len = result.len(), "tool result");

                messages.push(Message::tool_result(&tc.id, &result));
            }
        }

        Ok(NO_RESPONSE.to_string())
    }
}

#[async_trait]
impl Invocable for LlmAgent {
    async fn invoke(&self, prompt: &str, ctx: &InvocationContext) -> anyhow::Result<ResourceOutput> {
        let text = self.respond(prompt).await?;
        ctx.emit_delta(&text).await;
        Ok(ResourceOutput::Completed(text))
    }
}
