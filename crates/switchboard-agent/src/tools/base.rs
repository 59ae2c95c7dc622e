//! Tool trait: the function-calling interface shared by agents and the
//! network's `tool` resources.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use switchboard_core::types::ToolDefinition;

/// A callable function with a JSON-schema input.
///
/// Agents send `to_definition()` to the model and dispatch its tool calls by
/// `name()`; the network can also call a tool directly as a resource.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name (e.g. `"get-order-details"`).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// `{"type": "object", "properties": {...}, "required": [...]}`.
    fn parameters(&self) -> Value;

    /// Run the tool. The `Ok` string is what the model reads.
    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

/// Extract a required `String` param, returning a user-friendly error.
pub fn require_string(params: &HashMap<String, Value>, key: &str) -> anyhow::Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

/// Extract an optional non-empty `String` param.
pub fn optional_string(params: &HashMap<String, Value>, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}
