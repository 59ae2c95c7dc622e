//! Resource registry: name → invocable capability, plus the default resource.
//!
//! Populated once while the network is assembled and read-only afterwards.

use std::collections::HashMap;

use tracing::info;

use crate::resource::{RegisteredResource, ResourceDescriptor};

/// Reserved name of the fallback resource.
pub const DEFAULT_AGENT: &str = "default-agent";

/// Stores resources keyed by unique name.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, RegisteredResource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource.
    ///
    /// Fails if the name is taken or is the reserved default name.
    pub fn register(&mut self, resource: RegisteredResource) -> anyhow::Result<()> {
        let name = resource.name().to_string();
        if name == DEFAULT_AGENT {
            anyhow::bail!("'{DEFAULT_AGENT}' is reserved for the default resource");
        }
        self.insert(name, resource)
    }

    /// Register the fallback resource under [`DEFAULT_AGENT`].
    pub fn set_default(&mut self, mut resource: RegisteredResource) -> anyhow::Result<()> {
        resource.descriptor.name = DEFAULT_AGENT.to_string();
        self.insert(DEFAULT_AGENT.to_string(), resource)
    }

    fn insert(&mut self, name: String, resource: RegisteredResource) -> anyhow::Result<()> {
        if self.resources.contains_key(&name) {
            anyhow::bail!("resource '{name}' is already registered");
        }
        info!(resource = %name, kind = %resource.kind(), "registered resource");
        self.resources.insert(name, resource);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredResource> {
        self.resources.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn has_default(&self) -> bool {
        self.has(DEFAULT_AGENT)
    }

    /// Names of all resources, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Descriptors for the router, sorted by name.
    pub fn catalog(&self) -> Vec<ResourceDescriptor> {
        let mut catalog: Vec<ResourceDescriptor> = self
            .resources
            .values()
            .map(|r| r.descriptor.clone())
            .collect();
        catalog.sort_by(|a, b| a.name.cmp(&b.name));
        catalog
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
