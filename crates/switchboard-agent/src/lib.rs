//! Switchboard Agent: the routed agent network.
//!
//! This crate contains:
//! - **resource / registry**: invocable capabilities and the name → resource map
//! - **oracle / prompts**: LLM-backed routing and completion decisions
//! - **network**: the routing loop with suspend/resume over persistent threads
//! - **llm_agent / workflow / tools**: the resource kinds the router can pick
//! - **setup**: assembling a network from configuration

pub mod events;
pub mod llm_agent;
pub mod network;
pub mod oracle;
pub mod prompts;
pub mod registry;
pub mod resource;
pub mod setup;
pub mod state;
pub mod tools;
pub mod workflow;

pub use events::{EventSink, NetworkEvent};
pub use llm_agent::LlmAgent;
pub use network::{AgentNetwork, NetworkStream, RunInput, RunOptions};
pub use oracle::{
    CompletionOracle, CompletionVerdict, LlmRouter, RetryingRouter, RoutingDecision, RoutingOracle,
};
pub use registry::{ResourceRegistry, DEFAULT_AGENT};
pub use resource::{
    Confirmation, Invocable, InvocationContext, RegisteredResource, ResourceDescriptor,
    ResourceOutput,
};
pub use setup::build_network;
pub use state::IterationState;
pub use tools::{Tool, ToolRegistry};
pub use workflow::{Step, StepOutcome, Workflow};
