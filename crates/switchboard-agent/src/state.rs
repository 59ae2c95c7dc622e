//! Mutable record threaded through every iteration of one run.

use serde::Serialize;

use switchboard_core::types::{PendingRunHandle, ResourceType};

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IterationState {
    /// Original request; constant for the run.
    pub task: String,
    /// Routing decisions taken so far.
    pub iteration: u32,
    /// Selected resource ("" before the first decision and after completion).
    pub resource_id: String,
    pub resource_type: ResourceType,
    /// Input sent to the selected resource.
    pub prompt: String,
    /// Output of the most recently executed resource.
    pub result: String,
    /// Only ever set by the completion oracle.
    pub is_complete: bool,
    pub selection_reason: String,
    pub completion_reason: Option<String>,
    pub thread_id: String,
    pub thread_resource_id: String,
    /// Route once, execute once, skip the completion check.
    pub is_one_off: bool,
    /// Ask the router to also justify the resources it rejected.
    pub verbose_introspection: bool,
    /// Draft answer from an incomplete verdict, shown to the next routing call.
    pub feedback: Option<String>,
}

impl IterationState {
    pub fn new(
        task: impl Into<String>,
        thread_id: impl Into<String>,
        thread_resource_id: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            thread_id: thread_id.into(),
            thread_resource_id: thread_resource_id.into(),
            ..Default::default()
        }
    }

    /// Rebuild the state of a suspended run whose resource just produced `result`.
    pub fn resumed(
        handle: &PendingRunHandle,
        thread_id: impl Into<String>,
        thread_resource_id: impl Into<String>,
        verbose_introspection: bool,
    ) -> Self {
        Self {
            task: handle.task.clone(),
            iteration: handle.iteration,
            resource_id: handle.resource_id.clone(),
            resource_type: handle.resource_type,
            thread_id: thread_id.into(),
            thread_resource_id: thread_resource_id.into(),
            is_one_off: handle.one_off,
            verbose_introspection: verbose_introspection || handle.one_off,
            ..Default::default()
        }
    }

    /// Whether the completion oracle has something to judge.
    pub fn awaits_verdict(&self) -> bool {
        self.resource_type != ResourceType::None && !self.result.is_empty()
    }
}
