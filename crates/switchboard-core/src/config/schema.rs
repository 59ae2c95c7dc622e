//! Configuration schema.
//!
//! Hierarchy: `Config` → `NetworkConfig`, `Vec<AgentSpec>`, `ProvidersConfig`,
//! `HubConfig`, `StorageConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.switchboard/config.json` + env vars.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub network: NetworkConfig,
    pub agents: Vec<AgentSpec>,
    pub providers: ProvidersConfig,
    pub hub: HubConfig,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            agents: default_agents(),
            providers: ProvidersConfig::default(),
            hub: HubConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Find a declared agent by name.
    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name == name)
    }
}

// ─────────────────────────────────────────────
// Network
// ─────────────────────────────────────────────

/// Settings for the routing loop and its oracles.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    /// Network name; also the default thread owner id.
    pub name: String,
    /// Operating instructions passed to the router and completion checks.
    pub instructions: String,
    /// Model used by the router and as the agents' fallback model.
    pub model: String,
    /// Maximum routing decisions per run (0 = unbounded).
    pub max_iterations: u32,
    /// Maximum tokens to generate per model call.
    pub max_tokens: u32,
    /// Sampling temperature for agents (0.0 – 2.0).
    pub temperature: f64,
    /// Maximum LLM ↔ tool rounds inside one agent invocation.
    pub max_tool_iterations: u32,
    /// Wall-clock budget for one run, in seconds (0 = none).
    pub run_timeout_secs: u64,
    /// Thread messages shown to the router.
    pub history_limit: usize,
    /// Extra routing attempts after an unparseable decision.
    pub routing_retries: u32,
    /// Ask the router to explain rejected resources too.
    pub verbose_introspection: bool,
    /// Agent (from `agents`) registered as the fallback resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "order-agent-network".to_string(),
            instructions: "You are a network of helpful agents that can answer questions about \
                           orders and help with relevant information. The task is complete when \
                           the user's question has been answered with data returned by an agent, \
                           workflow or tool."
                .to_string(),
            model: "gpt-4o-mini".to_string(),
            max_iterations: 10,
            max_tokens: 4096,
            temperature: 0.7,
            max_tool_iterations: 10,
            run_timeout_secs: 300,
            history_limit: 20,
            routing_retries: 0,
            verbose_introspection: false,
            default_agent: Some("generalAgent".to_string()),
        }
    }
}

// ─────────────────────────────────────────────
// Agents
// ─────────────────────────────────────────────

/// Declarative LLM agent.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSpec {
    pub name: String,
    pub description: String,
    pub instructions: String,
    /// Overrides the network model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Tool names the agent may call.
    pub tools: Vec<String>,
}

fn default_agents() -> Vec<AgentSpec> {
    vec![
        AgentSpec {
            name: "orderAgentSingle".into(),
            description: "This agent is used to get order details by order ID".into(),
            instructions: "You are a helpful order management assistant. Help users get order \
                           details by order ID; always ask for an order ID if none is provided. \
                           If an order is not found, say so politely. Include status and date. \
                           Do not fabricate details that the tool did not return."
                .into(),
            model: None,
            tools: vec!["get-order-details".into()],
        },
        AgentSpec {
            name: "orderAgentList".into(),
            description: "This agent is used to get a list of orders.".into(),
            instructions: "You are a helpful order management assistant. Use the order list \
                           tool to retrieve orders filtered by product type, status or customer \
                           email, and present them as a clear table with status and date. \
                           Do not fabricate details that the tool did not return."
                .into(),
            model: None,
            tools: vec!["get-order-list".into()],
        },
        AgentSpec {
            name: "generalAgent".into(),
            description: "This is the default agent that will be used if no other agent is available."
                .into(),
            instructions: "You are a helpful assistant that can answer questions and help with \
                           relevant information."
                .into(),
            model: None,
            tools: Vec::new(),
        },
    ]
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Configuration for a single LLM provider (API key, base URL, headers).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    /// Custom API base URL (overrides provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl ProviderConfig {
    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// All provider configurations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub openrouter: ProviderConfig,
    pub deepseek: ProviderConfig,
    pub groq: ProviderConfig,
    pub vllm: ProviderConfig,
}

impl ProvidersConfig {
    fn entries(&self) -> [(&'static str, &ProviderConfig); 5] {
        [
            ("openai", &self.openai),
            ("openrouter", &self.openrouter),
            ("deepseek", &self.deepseek),
            ("groq", &self.groq),
            ("vllm", &self.vllm),
        ]
    }

    pub(crate) fn entries_mut(&mut self) -> [(&'static str, &mut ProviderConfig); 5] {
        [
            ("openai", &mut self.openai),
            ("openrouter", &mut self.openrouter),
            ("deepseek", &mut self.deepseek),
            ("groq", &mut self.groq),
            ("vllm", &mut self.vllm),
        ]
    }

    /// Get a provider config by name (e.g. `"openai"`).
    pub fn get_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        self.entries()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c)
    }

    /// Convert to a map for use with the provider registry.
    pub fn to_map(&self) -> HashMap<String, ProviderConfig> {
        self.entries()
            .into_iter()
            .map(|(name, config)| (name.to_string(), config.clone()))
            .collect()
    }
}

// ─────────────────────────────────────────────
// Order hub
// ─────────────────────────────────────────────

/// Backend order API credentials and paging.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubConfig {
    /// Base URL, e.g. `https://hub.example.com`.
    pub api_url: String,
    pub user_email: String,
    pub user_password: String,
    /// Orders returned by one list call.
    pub page_limit: u32,
    /// How long an auth token is reused, in seconds.
    pub token_ttl_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            user_email: String::new(),
            user_password: String::new(),
            page_limit: 5,
            token_ttl_secs: 1800,
        }
    }
}

impl HubConfig {
    /// Whether URL and credentials are all present.
    pub fn is_configured(&self) -> bool {
        !self.api_url.is_empty() && !self.user_email.is_empty() && !self.user_password.is_empty()
    }
}

// ─────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────

/// Where threads are persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub threads_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            threads_dir: "~/.switchboard/threads".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
