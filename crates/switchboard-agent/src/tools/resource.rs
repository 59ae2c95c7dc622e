//! Exposes a [`Tool`] to the router as a `tool` resource.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use switchboard_core::types::ResourceType;

use super::base::Tool;
use crate::resource::{Invocable, InvocationContext, RegisteredResource, ResourceDescriptor, ResourceOutput};

/// Calls the wrapped tool with the routed prompt as its JSON arguments.
pub struct ToolResource {
    tool: Arc<dyn Tool>,
}

impl ToolResource {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self { tool }
    }

    /// Registry entry named and described after the tool.
    pub fn registered(tool: Arc<dyn Tool>) -> RegisteredResource {
        let descriptor = ResourceDescriptor::new(
            tool.name(),
            tool.description(),
            ResourceType::Tool,
            tool.parameters(),
        );
        RegisteredResource::new(descriptor, Arc::new(Self::new(tool)))
    }
}

#[async_trait]
impl Invocable for ToolResource {
    async fn invoke(&self, prompt: &str, ctx: &InvocationContext) -> anyhow::Result<ResourceOutput> {
        let args: Value = if prompt.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(prompt).map_err(|e| {
                anyhow::anyhow!("tool '{}' expects JSON arguments: {e}", self.tool.name())
            })?
        };
        let Value::Object(map) = args else {
            anyhow::bail!("tool '{}' expects a JSON object of arguments", self.tool.name());
        };
        let params: HashMap<String, Value> = map.into_iter().collect();

        let output = self.tool.execute(params).await?;
        ctx.emit_delta(&output).await;
        Ok(ResourceOutput::Completed(output))
    }
}
