//! The six capability managers, one per MCP namespace, registered into a
//! [`mcprs_core::CapabilityRegistry`] by [`crate::builder::ServerBuilder`].

pub mod completion;
pub mod core;
pub mod logging;
pub mod prompts;
pub mod resources;
pub mod tools;

pub use completion::CompletionManager;
pub use core::CoreManager;
pub use logging::LoggingManager;
pub use prompts::PromptsManager;
pub use resources::ResourcesManager;
pub use tools::ToolsManager;
