//! Typed errors surfaced by the network runtime.

use std::time::Duration;

use thiserror::Error;

/// Everything that can abort a network run or a resume.
///
/// Exhausting the iteration budget is deliberately absent: it is a normal
/// outcome reported through the run result.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The routing model's reply did not match the decision schema.
    #[error("routing decision could not be parsed: {0}")]
    RoutingParse(String),

    /// The completion model's reply did not match the verdict schema.
    #[error("completion verdict could not be parsed: {0}")]
    CompletionParse(String),

    /// The router picked a name that is not in the registry.
    #[error("resource '{0}' is not registered in this network")]
    UnknownResource(String),

    /// The invoked resource failed.
    #[error("resource '{resource}' failed: {message}")]
    ResourceExecution { resource: String, message: String },

    /// `resume` was called but nothing is suspended on the thread.
    #[error("no suspended run is pending on thread '{0}'; start a new run instead")]
    StaleResume(String),

    /// A new run was started while the thread still waits for a confirmation.
    #[error("thread '{thread_id}' is waiting on suspended run '{run_id}'; resume or cancel it first")]
    ThreadSuspended { thread_id: String, run_id: String },

    /// The confirmation does not fit the shape the suspended run expects.
    #[error("confirmation rejected: {0}")]
    InvalidConfirmation(String),

    /// The model provider returned an error instead of a completion.
    #[error("model provider error: {0}")]
    Provider(String),

    /// Thread persistence failed.
    #[error("conversation store error: {0}")]
    Store(#[from] std::io::Error),

    /// The run exceeded its wall-clock budget.
    #[error("run timed out after {0:?}")]
    Timeout(Duration),
}

impl NetworkError {
    /// Wrap a resource failure.
    pub fn execution(resource: impl Into<String>, err: impl std::fmt::Display) -> Self {
        NetworkError::ResourceExecution {
            resource: resource.into(),
            message: err.to_string(),
        }
    }

    /// Stable short name, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            NetworkError::RoutingParse(_) => "routing_parse",
            NetworkError::CompletionParse(_) => "completion_parse",
            NetworkError::UnknownResource(_) => "unknown_resource",
            NetworkError::ResourceExecution { .. } => "resource_execution",
            NetworkError::StaleResume(_) => "stale_resume",
            NetworkError::ThreadSuspended { .. } => "thread_suspended",
            NetworkError::InvalidConfirmation(_) => "invalid_confirmation",
            NetworkError::Provider(_) => "provider",
            NetworkError::Store(_) => "store",
            NetworkError::Timeout(_) => "timeout",
        }
    }
}

/// Result alias for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
