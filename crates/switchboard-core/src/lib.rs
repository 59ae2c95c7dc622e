//! Switchboard core: types, errors, configuration, and the conversation store
//! shared by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod thread;
pub mod types;
pub mod utils;

pub use error::{NetworkError, Result};
pub use types::{Message, PendingRunHandle, ResourceType, Role, Thread, ThreadMessage};
