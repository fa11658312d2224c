//! The request processor: parses a raw JSON-RPC frame, dispatches it through
//! a [`CapabilityRegistry`], and formats the reply. Shared by both
//! transports so dispatch semantics stay identical regardless of wire
//! carrier.

use mcprs_core::{CapabilityRegistry, RequestContext};
use mcprs_protocol::jsonrpc::{error_codes, JsonRpcError, JsonRpcResponse, RawMessage};

/// Process one JSON-RPC frame. Returns `None` when no reply should be
/// written — notifications, and requests whose handler itself produced no
/// value (`Ok(None)`, e.g. `notifications/initialized` dispatched through a
/// manager that claims it as a request by mistake).
pub async fn process_request(
    registry: &CapabilityRegistry,
    raw: &str,
    ctx: RequestContext,
) -> Option<JsonRpcResponse> {
    let message: RawMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => return Some(JsonRpcResponse::parse_error(e.to_string())),
    };

    let is_notification = message.is_notification();
    let id = message.id.clone();

    let Some(method) = message.method.filter(|m| !m.is_empty()) else {
        return reply_unless_notification(
            is_notification,
            id,
            JsonRpcError::new(error_codes::INVALID_REQUEST, "method must be a non-empty string"),
        );
    };

    let Some(manager) = registry.lookup(&method) else {
        return reply_unless_notification(
            is_notification,
            id,
            JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method [{method}] not found"),
            ),
        );
    };

    match manager.execute(&method, message.params, &ctx).await {
        Ok(Some(value)) if !is_notification => {
            Some(JsonRpcResponse::success(id.expect("request carries an id"), value))
        }
        Ok(_) => None,
        Err(err) => reply_unless_notification(is_notification, id, err),
    }
}

fn reply_unless_notification(
    is_notification: bool,
    id: Option<mcprs_protocol::jsonrpc::RequestId>,
    error: JsonRpcError,
) -> Option<JsonRpcResponse> {
    if is_notification {
        None
    } else {
        Some(JsonRpcResponse::error(id, error))
    }
}
