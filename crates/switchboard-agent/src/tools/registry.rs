//! Tool registry: the tool catalog agents pick their tools from.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use switchboard_core::types::ToolDefinition;
use tracing::{debug, warn};

use super::base::Tool;

/// Tools keyed by name. Cloning shares the tools, not copies them.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; a tool already registered under the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "tool replaced");
        } else {
            debug!(tool = %name, "tool added to catalog");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// The tools one agent is allowed to call.
    ///
    /// Fails on the first name missing from the catalog.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> anyhow::Result<ToolRegistry> {
        let mut subset = ToolRegistry::new();
        for name in names.iter().map(AsRef::as_ref) {
            let Some(tool) = self.tools.get(name) else {
                anyhow::bail!("unknown tool '{name}'");
            };
            subset.tools.insert(name.to_string(), Arc::clone(tool));
        }
        Ok(subset)
    }

    /// Function definitions sent to the model, sorted by name.
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Run a tool call requested by the model.
    ///
    /// Failures come back as text so the model can react to them.
    pub async fn execute(&self, name: &str, params: HashMap<String, Value>) -> String {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "model called an unknown tool");
            return format!("Error: Tool '{name}' not found");
        };

        match tool.execute(params).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                format!("Error executing {name}: {e:#}")
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
