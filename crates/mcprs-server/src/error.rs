//! Domain error types raised by capability managers.

use mcprs_protocol::jsonrpc::{error_codes, JsonRpcError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("invalid completion reference: {0}")]
    InvalidCompletionRef(String),

    #[error("{0}")]
    Internal(String),
}

impl From<ServerError> for JsonRpcError {
    fn from(err: ServerError) -> Self {
        match &err {
            ServerError::ResourceNotFound(_) => {
                JsonRpcError::new(error_codes::RESOURCE_NOT_FOUND, err.to_string())
            }
            ServerError::InvalidParams(_) => {
                JsonRpcError::new(error_codes::INVALID_PARAMS, err.to_string())
            }
            _ => JsonRpcError::new(error_codes::INTERNAL_ERROR, err.to_string()),
        }
    }
}
