//! Tools: the function-calling trait, its registry, and the order hub tools.

pub mod base;
pub mod hub;
pub mod orders;
pub mod registry;
pub mod resource;

pub use base::{optional_string, require_string, Tool};
pub use hub::HubClient;
pub use orders::{OrderDetailsTool, OrderListTool};
pub use registry::ToolRegistry;
pub use resource::ToolResource;
