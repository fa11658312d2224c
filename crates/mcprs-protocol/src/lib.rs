//! Wire-level primitives for the MCP protocol: JSON-RPC envelopes, the MCP
//! type catalogue, session identifiers, and the shared error vocabulary.
//!
//! This crate has no knowledge of dispatch, transports, or capability
//! managers — it is the "what the bytes mean" layer only.

pub mod error;
pub mod jsonrpc;
pub mod session;
pub mod types;

pub use error::ProtocolError;
pub use jsonrpc::{
    error_codes, JsonRpcError, JsonRpcNotification, JsonRpcResponse, JsonRpcResponsePayload,
    JsonRpcVersion, RawMessage, RequestId,
};
pub use session::SessionId;
