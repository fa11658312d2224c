//! Transport layer: newline-delimited stdio and Streamable HTTP+SSE,
//! both dispatching through the same [`mcprs_server::McpServer`] registry.

pub mod config;
pub mod error;
pub mod http;
pub mod shutdown;
pub mod stdio;

pub use config::{CorsConfig, ServerConfig};
pub use error::TransportError;
pub use http::HttpTransport;
pub use shutdown::ShutdownState;
