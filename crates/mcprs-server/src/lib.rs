//! Capability managers, the request processor, and server assembly for the
//! MCP protocol engine. Transport-agnostic: stdio and HTTP both dispatch
//! through [`McpServer::handle`].

pub mod builder;
pub mod builtins;
pub mod error;
pub mod managers;
pub mod processor;

pub use builder::{McpServer, ServerBuilder};
pub use error::ServerError;
