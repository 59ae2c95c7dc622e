//! Assemble an [`AgentNetwork`] from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use switchboard_core::config::Config;
use switchboard_core::thread::ConversationStore;
use switchboard_providers::{LlmProvider, LlmRequestConfig};

use crate::llm_agent::LlmAgent;
use crate::network::AgentNetwork;
use crate::oracle::{CompletionOracle, LlmRouter, RetryingRouter, RoutingOracle};
use crate::registry::ResourceRegistry;
use crate::tools::{HubClient, OrderDetailsTool, OrderListTool, ToolRegistry, ToolResource};
use crate::workflow::{meeting_invite_workflow, order_status_workflow};

/// Order tools, or an empty catalog when the hub is not configured.
pub fn build_tools(config: &Config) -> anyhow::Result<(ToolRegistry, Option<Arc<OrderDetailsTool>>)> {
    let mut tools = ToolRegistry::new();
    if !config.hub.is_configured() {
        warn!("order hub not configured; order tools and workflows are disabled");
        return Ok((tools, None));
    }
    let hub = Arc::new(HubClient::from_config(&config.hub)?);
    let details = Arc::new(OrderDetailsTool::new(hub.clone()));
    tools.register(details.clone());
    tools.register(Arc::new(OrderListTool::new(hub)));
    Ok((tools, Some(details)))
}

/// Register the configured agents, tools and workflows and wire the oracles.
pub fn build_network(
    config: &Config,
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn ConversationStore>,
) -> anyhow::Result<AgentNetwork> {
    let net = &config.network;
    let (tools, order_details) = build_tools(config)?;
    let mut registry = ResourceRegistry::new();

    let request_config = LlmRequestConfig {
        max_tokens: net.max_tokens,
        temperature: net.temperature,
        json_output: false,
    };
    for spec in &config.agents {
        let agent_tools = match tools.subset(&spec.tools) {
            Ok(subset) => subset,
            Err(e) if tools.is_empty() => {
                warn!(agent = %spec.name, error = %e, "agent tools unavailable");
                ToolRegistry::new()
            }
            Err(e) => return Err(e.context(format!("agent '{}'", spec.name))),
        };
        let agent = LlmAgent::new(
            &spec.name,
            &spec.description,
            &spec.instructions,
            provider.clone(),
            Some(spec.model.clone().unwrap_or_else(|| net.model.clone())),
        )
        .with_tools(agent_tools)
        .with_request_config(request_config.clone())
        .with_max_tool_iterations(net.max_tool_iterations as usize);

        if net.default_agent.as_deref() == Some(spec.name.as_str()) {
            registry.set_default(agent.into_resource())?;
        } else {
            registry
                .register(agent.into_resource())
                .with_context(|| format!("registering agent '{}'", spec.name))?;
        }
    }

    for name in tools.tool_names() {
        if let Some(tool) = tools.get(&name) {
            registry.register(ToolResource::registered(Arc::clone(tool)))?;
        }
    }
    if let Some(details) = order_details {
        registry.register(order_status_workflow(details).into_resource())?;
    }
    registry.register(meeting_invite_workflow()?.into_resource())?;

    if let Some(default) = &net.default_agent {
        if !registry.has_default() {
            warn!(agent = %default, "configured default agent is not declared");
        }
    }

    let llm_router = Arc::new(
        LlmRouter::new(provider, &net.model, &net.instructions, net.max_tokens)
            .with_catalog(registry.catalog()),
    );
    let router: Arc<dyn RoutingOracle> = if net.routing_retries > 0 {
        Arc::new(RetryingRouter::new(llm_router.clone(), net.routing_retries))
    } else {
        llm_router.clone()
    };
    let completion: Arc<dyn CompletionOracle> = llm_router;

    info!(
        network = %net.name,
        resources = registry.len(),
        model = %net.model,
        "network assembled"
    );

    Ok(AgentNetwork::new(&net.name, registry, router, completion, store)
        .with_max_iterations(net.max_iterations)
        .with_history_limit(net.history_limit)
        .with_run_timeout(
            (net.run_timeout_secs > 0).then(|| Duration::from_secs(net.run_timeout_secs)),
        )
        .with_verbose_introspection(net.verbose_introspection))
}
