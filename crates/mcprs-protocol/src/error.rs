//! Envelope-level protocol errors, independent of any particular handler.

use crate::jsonrpc::{error_codes, JsonRpcError};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to parse JSON-RPC envelope: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("method name was empty")]
    EmptyMethod,
}

impl From<ProtocolError> for JsonRpcError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Parse(e) => JsonRpcError::new(error_codes::PARSE_ERROR, e.to_string()),
            ProtocolError::EmptyMethod => {
                JsonRpcError::new(error_codes::INVALID_REQUEST, "method must not be empty")
            }
        }
    }
}
