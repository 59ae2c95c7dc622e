//! Stream events emitted while a network run progresses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use switchboard_core::types::{ResourceType, RunOutcome};

/// Events yielded by `AgentNetwork::stream`, in emission order.
///
/// Wire names:
/// - `routing-selected`: the router picked the next resource
/// - `resource-output-delta`: a chunk of resource output
/// - `resource-finished`: the resource returned its result
/// - `resource-suspended`: the resource paused for a confirmation
/// - `loop-complete`: the run ended (completed, budget or waiting)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum NetworkEvent {
    RoutingSelected {
        iteration: u32,
        resource_id: String,
        resource_type: ResourceType,
        prompt: String,
        selection_reason: String,
    },
    ResourceOutputDelta {
        resource_id: String,
        delta: String,
    },
    ResourceFinished {
        iteration: u32,
        resource_id: String,
        resource_type: ResourceType,
        result: String,
    },
    ResourceSuspended {
        resource_id: String,
        run_id: String,
        payload: Value,
    },
    LoopComplete {
        outcome: RunOutcome,
    },
}

impl NetworkEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoutingSelected { .. } => "routing-selected",
            Self::ResourceOutputDelta { .. } => "resource-output-delta",
            Self::ResourceFinished { .. } => "resource-finished",
            Self::ResourceSuspended { .. } => "resource-suspended",
            Self::LoopComplete { .. } => "loop-complete",
        }
    }
}

/// Optional sender side of an event stream. Non-streaming runs use
/// [`EventSink::none`] and every emit is a no-op.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<NetworkEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<NetworkEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Send an event, waiting for channel capacity.
    ///
    /// A dropped receiver is not an error; the run carries on unobserved.
    pub async fn emit(&self, event: NetworkEvent) {
        if let Some(tx) = &self.tx {
            let kind = event.event_type();
            if tx.send(event).await.is_err() {
                debug!(event = kind, "stream receiver dropped");
            }
        }
    }
}
