//! Routing and completion oracles.
//!
//! Both are traits so the loop can be driven by scripted decisions in tests;
//! [`LlmRouter`] implements both on top of an [`LlmProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use switchboard_core::error::{NetworkError, Result};
use switchboard_core::types::{Message, ResourceType, ThreadMessage};
use switchboard_providers::{LlmProvider, LlmRequestConfig};

use crate::prompts;
use crate::resource::ResourceDescriptor;
use crate::state::IterationState;

/// The router's pick for the next iteration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub prompt: String,
    #[serde(default)]
    pub selection_reason: String,
}

impl RoutingDecision {
    /// Whether the router declined to pick anything.
    pub fn is_none(&self) -> bool {
        self.resource_type == ResourceType::None || self.resource_id == "none"
    }
}

/// Judgement on the last contribution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionVerdict {
    pub is_complete: bool,
    #[serde(default)]
    pub completion_reason: String,
    #[serde(default)]
    pub final_result: String,
}

#[async_trait]
pub trait RoutingOracle: Send + Sync {
    async fn select_resource(
        &self,
        state: &IterationState,
        catalog: &[ResourceDescriptor],
        history: &[ThreadMessage],
    ) -> Result<RoutingDecision>;
}

#[async_trait]
pub trait CompletionOracle: Send + Sync {
    async fn check_completion(
        &self,
        state: &IterationState,
        history: &[ThreadMessage],
    ) -> Result<CompletionVerdict>;
}

// ─────────────────────────────────────────────
// LLM-backed oracle
// ─────────────────────────────────────────────

/// Routing and completion through one chat model in JSON mode.
pub struct LlmRouter {
    provider: Arc<dyn LlmProvider>,
    model: String,
    /// Operating instructions of the network, passed through unchanged.
    instructions: String,
    max_tokens: u32,
    /// Catalog seen by the completion check; set by [`LlmRouter::with_catalog`].
    catalog: Vec<ResourceDescriptor>,
}

impl LlmRouter {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        instructions: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            instructions: instructions.into(),
            max_tokens,
            catalog: Vec::new(),
        }
    }

    /// Catalog listed in the system prompt of completion checks.
    pub fn with_catalog(mut self, catalog: Vec<ResourceDescriptor>) -> Self {
        self.catalog = catalog;
        self
    }

    async fn ask(
        &self,
        catalog: &[ResourceDescriptor],
        history: &[ThreadMessage],
        prompt: String,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(prompts::router_instructions(
            &self.instructions,
            catalog,
        )));
        messages.extend(history.iter().map(ThreadMessage::to_message));
        messages.push(Message::user(prompt));

        debug!(
            model = %self.model,
            messages = messages.len(),
            "calling router model"
        );
        let config = LlmRequestConfig::structured(self.max_tokens);
        let resp = self
            .provider
            .chat(&messages, None, &self.model, &config)
            .await;

        if resp.is_error() {
            return Err(NetworkError::Provider(resp.content.unwrap_or_default()));
        }
        Ok(resp.content.unwrap_or_default())
    }
}

#[async_trait]
impl RoutingOracle for LlmRouter {
    async fn select_resource(
        &self,
        state: &IterationState,
        catalog: &[ResourceDescriptor],
        history: &[ThreadMessage],
    ) -> Result<RoutingDecision> {
        let reply = self
            .ask(catalog, history, prompts::routing_prompt(state))
            .await?;
        parse_json_reply(&reply).map_err(NetworkError::RoutingParse)
    }
}

#[async_trait]
impl CompletionOracle for LlmRouter {
    async fn check_completion(
        &self,
        state: &IterationState,
        history: &[ThreadMessage],
    ) -> Result<CompletionVerdict> {
        let reply = self
            .ask(&self.catalog, history, prompts::completion_prompt(state))
            .await?;
        parse_json_reply(&reply).map_err(NetworkError::CompletionParse)
    }
}

/// Decode a JSON object from a model reply.
///
/// Accepts a bare object, a ```json fenced block, or an object embedded in
/// surrounding prose.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> std::result::Result<T, String> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err("empty reply".to_string());
    }

    let unfenced = strip_fence(trimmed);
    match serde_json::from_str::<T>(unfenced) {
        Ok(value) => Ok(value),
        Err(first) => {
            let (Some(start), Some(end)) = (unfenced.find('{'), unfenced.rfind('}')) else {
                return Err(format!("{first}: {}", preview(trimmed)));
            };
            if end <= start {
                return Err(format!("{first}: {}", preview(trimmed)));
            }
            serde_json::from_str::<T>(&unfenced[start..=end])
                .map_err(|e| format!("{e}: {}", preview(trimmed)))
        }
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn preview(text: &str) -> String {
    switchboard_core::utils::truncate_string(text, 200)
}

// ─────────────────────────────────────────────
// Retry wrapper
// ─────────────────────────────────────────────

/// Re-asks the inner router when its reply cannot be parsed.
///
/// Only [`NetworkError::RoutingParse`] is retried, at most `retries` extra
/// times; every other error is returned on first sight.
pub struct RetryingRouter {
    inner: Arc<dyn RoutingOracle>,
    retries: u32,
}

impl RetryingRouter {
    pub fn new(inner: Arc<dyn RoutingOracle>, retries: u32) -> Self {
        Self { inner, retries }
    }
}

#[async_trait]
impl RoutingOracle for RetryingRouter {
    async fn select_resource(
        &self,
        state: &IterationState,
        catalog: &[ResourceDescriptor],
        history: &[ThreadMessage],
    ) -> Result<RoutingDecision> {
        let mut attempt = 0;
        loop {
            match self.inner.select_resource(state, catalog, history).await {
                Err(NetworkError::RoutingParse(reason)) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max = self.retries,
                        iteration = state.iteration,
                        "routing reply unparseable, retrying: {reason}"
                    );
                }
                other => return other,
            }
        }
    }
}
