//! Resources: the agents, workflows and tools a network can dispatch to.
//!
//! Every resource is a tagged kind over one [`Invocable`] interface. The
//! network only ever sees a prompt going in and a [`ResourceOutput`] coming
//! back; suspension is an ordinary output variant, not an error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use switchboard_core::types::{ConfirmationKind, PendingRunHandle, ResourceType};

use crate::events::{EventSink, NetworkEvent};

// ─────────────────────────────────────────────
// Descriptor
// ─────────────────────────────────────────────

/// Catalog entry shown to the router. Immutable once registered.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub name: String,
    pub description: String,
    pub kind: ResourceType,
    /// JSON schema of the expected prompt; `null` for free-text agents.
    pub input_schema: Value,
}

impl ResourceDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        kind: ResourceType,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            input_schema,
        }
    }

    /// Descriptor for a free-text agent.
    pub fn agent(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ResourceType::Agent, Value::Null)
    }
}

// ─────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────

/// What one invocation produced.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceOutput {
    /// Finished with a text result.
    Completed(String),
    /// Paused until the user confirms. `run_id` identifies the paused
    /// invocation to [`Invocable::resume`].
    Suspended {
        run_id: String,
        payload: Value,
        expects: ConfirmationKind,
    },
}

// ─────────────────────────────────────────────
// Confirmation
// ─────────────────────────────────────────────

/// User answer to a suspended run.
#[derive(Clone, Debug, PartialEq)]
pub enum Confirmation {
    Yes,
    No,
    Data(Value),
}

impl Confirmation {
    /// Read free-form user input.
    ///
    /// `y`/`yes`/`n`/`no` (any case, optional trailing punctuation) map to the
    /// yes/no variants; valid JSON becomes structured data; anything else is
    /// kept as a JSON string.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let word = trimmed
            .trim_end_matches(['.', '!'])
            .to_ascii_lowercase();
        match word.as_str() {
            "y" | "yes" => return Confirmation::Yes,
            "n" | "no" => return Confirmation::No,
            _ => {}
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::String(s)) => Confirmation::parse_word_or_text(s),
            Ok(value) => Confirmation::Data(value),
            Err(_) => Confirmation::Data(Value::String(trimmed.to_string())),
        }
    }

    fn parse_word_or_text(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => Confirmation::Yes,
            "no" | "n" => Confirmation::No,
            _ => Confirmation::Data(Value::String(s)),
        }
    }

    /// The shape this confirmation satisfies.
    pub fn kind(&self) -> ConfirmationKind {
        match self {
            Confirmation::Yes | Confirmation::No => ConfirmationKind::YesNo,
            Confirmation::Data(_) => ConfirmationKind::Structured,
        }
    }

    /// Whether a handle expecting `expected` accepts this answer.
    pub fn satisfies(&self, expected: ConfirmationKind) -> bool {
        match expected {
            ConfirmationKind::YesNo => self.kind() == ConfirmationKind::YesNo,
            ConfirmationKind::Structured => true,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Confirmation::Yes => Value::String("yes".into()),
            Confirmation::No => Value::String("no".into()),
            Confirmation::Data(v) => v.clone(),
        }
    }

    /// Text stored in the thread for this answer.
    pub fn as_text(&self) -> String {
        match self {
            Confirmation::Yes => "yes".into(),
            Confirmation::No => "no".into(),
            Confirmation::Data(Value::String(s)) => s.clone(),
            Confirmation::Data(v) => v.to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Invocation
// ─────────────────────────────────────────────

/// Per-call context handed to a resource.
#[derive(Clone, Debug)]
pub struct InvocationContext {
    pub thread_id: String,
    /// Name the resource is registered under.
    pub resource: String,
    events: EventSink,
}

impl InvocationContext {
    pub fn new(thread_id: impl Into<String>, resource: impl Into<String>, events: EventSink) -> Self {
        Self {
            thread_id: thread_id.into(),
            resource: resource.into(),
            events,
        }
    }

    /// Forward a chunk of output to stream subscribers.
    pub async fn emit_delta(&self, delta: impl Into<String>) {
        self.events
            .emit(NetworkEvent::ResourceOutputDelta {
                resource_id: self.resource.clone(),
                delta: delta.into(),
            })
            .await;
    }
}

/// Uniform call interface of every resource kind.
#[async_trait]
pub trait Invocable: Send + Sync {
    /// Run the resource on a prompt (free text for agents, serialized JSON
    /// for workflows and tools).
    async fn invoke(&self, prompt: &str, ctx: &InvocationContext) -> anyhow::Result<ResourceOutput>;

    /// Continue a run this resource suspended earlier.
    async fn resume(
        &self,
        handle: &PendingRunHandle,
        confirmation: &Confirmation,
        ctx: &InvocationContext,
    ) -> anyhow::Result<ResourceOutput> {
        let _ = (confirmation, ctx);
        anyhow::bail!(
            "resource '{}' does not support resuming run '{}'",
            handle.resource_id,
            handle.run_id
        )
    }
}

/// A resource as stored in the registry.
#[derive(Clone)]
pub struct RegisteredResource {
    pub descriptor: ResourceDescriptor,
    pub handler: Arc<dyn Invocable>,
}

impl RegisteredResource {
    pub fn new(descriptor: ResourceDescriptor, handler: Arc<dyn Invocable>) -> Self {
        Self {
            descriptor,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn kind(&self) -> ResourceType {
        self.descriptor.kind
    }
}

impl std::fmt::Debug for RegisteredResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredResource")
            .field("name", &self.descriptor.name)
            .field("kind", &self.descriptor.kind)
            .finish()
    }
}
