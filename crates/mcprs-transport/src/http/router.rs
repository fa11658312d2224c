//! Axum handlers implementing the Streamable HTTP method matrix (spec
//! §4.11): `OPTIONS` preflight, `GET` info/SSE-upgrade, `POST` dispatch,
//! `DELETE` session termination.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use mcprs_core::RequestContext;
use mcprs_protocol::jsonrpc::{error_codes, JsonRpcError, JsonRpcResponse, JsonRpcResponsePayload, RawMessage};
use mcprs_protocol::types::capabilities::{is_supported_protocol_version, DEFAULT_PROTOCOL_VERSION};
use mcprs_server::McpServer;
use serde_json::json;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt as _;

use crate::config::ServerConfig;
use crate::http::session::SessionTable;
use crate::http::sse::SseConnections;
use crate::shutdown::ShutdownState;

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

#[derive(Clone)]
pub struct HttpState {
    pub server: Arc<McpServer>,
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<SessionTable>,
    pub sse: Arc<SseConnections>,
    pub shutdown: Arc<ShutdownState>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn protocol_version_error(version: &str) -> JsonRpcResponse {
    JsonRpcResponse::error(
        None,
        JsonRpcError::new(
            error_codes::SERVER_ERROR,
            format!(
                "Unsupported protocol version: {version}. Supported versions: {}",
                mcprs_protocol::types::capabilities::SUPPORTED_PROTOCOL_VERSIONS.join(", ")
            ),
        ),
    )
}

/// Validate `Mcp-Protocol-Version`; absent is accepted as the default.
/// Returns `Err` with the ready-to-send error reply on rejection.
fn check_protocol_version(headers: &HeaderMap) -> Result<String, JsonRpcResponse> {
    match header_str(headers, PROTOCOL_VERSION_HEADER) {
        None => Ok(DEFAULT_PROTOCOL_VERSION.to_string()),
        Some(v) if is_supported_protocol_version(v) => Ok(v.to_string()),
        Some(v) => Err(protocol_version_error(v)),
    }
}

pub async fn options_handler() -> impl IntoResponse {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert("access-control-allow-methods", HeaderValue::from_static("POST, GET, DELETE, OPTIONS"));
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Content-Type, Accept, Mcp-Session-Id, Mcp-Protocol-Version"),
    );
    headers.insert(
        "access-control-expose-headers",
        HeaderValue::from_static("Mcp-Session-Id, Mcp-Protocol-Version"),
    );
    headers.insert("access-control-max-age", HeaderValue::from_static("86400"));
    response
}

pub async fn get_handler(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if let Err(err) = check_protocol_version(&headers) {
        return Json(err).into_response();
    }

    let wants_sse = header_str(&headers, "accept")
        .is_some_and(|accept| accept.contains("text/event-stream"));

    if !wants_sse {
        return Json(json!({
            "name": "mcprs",
            "transport": "http",
            "endpoint": state.config.endpoint_path,
        }))
        .into_response();
    }

    let session_id = header_str(&headers, SESSION_HEADER).map(str::to_string);
    let Some((handle, rx)) = state.sse.register(session_id.clone()) else {
        return (StatusCode::SERVICE_UNAVAILABLE, "SSE connection table is full").into_response();
    };

    let body_stream = UnboundedReceiverStream::new(rx).map(|frame| Ok::<_, std::io::Error>(frame));
    let initial = futures::stream::once(async { Ok::<_, std::io::Error>(": sse accepted\r\n\r\n".to_string()) });
    let stream = initial.chain(body_stream);

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(Body::from_stream(stream))
        .expect("static headers are valid");

    if let Some(sid) = session_id {
        state.sse.bind_session(handle, sid.clone());
        if let Ok(value) = HeaderValue::from_str(&sid) {
            response.headers_mut().insert("mcp-session-id", value);
        }
    }

    response
}

pub async fn post_handler(State(state): State<HttpState>, headers: HeaderMap, body: String) -> Response {
    if state.shutdown.is_shutting_down() {
        return json_rpc_response(&headers, shutting_down_error());
    }

    if let Err(err) = check_protocol_version(&headers) {
        return json_rpc_response(&headers, err);
    }

    let _guard = state.shutdown.track_request();

    let raw: RawMessage = match serde_json::from_str(&body) {
        Ok(raw) => raw,
        Err(e) => return json_rpc_response(&headers, JsonRpcResponse::parse_error(e.to_string())),
    };
    let method = raw.method.clone().unwrap_or_default();
    let session_header = header_str(&headers, SESSION_HEADER).map(str::to_string);

    let requires_session = !matches!(method.as_str(), "initialize" | "notifications/initialized");
    let mut session_id = None;
    if requires_session {
        match &session_header {
            None => {
                return json_rpc_response(
                    &headers,
                    JsonRpcResponse::error(
                        raw.id,
                        JsonRpcError::new(error_codes::INVALID_REQUEST, "Mcp-Session-Id header required"),
                    ),
                )
            }
            Some(id) => {
                for reaped_id in state.sessions.reap_expired(state.config.session_timeout) {
                    state.sse.remove_for_session(&reaped_id);
                }
                if !state.sessions.is_valid(id, state.config.session_timeout) {
                    return json_rpc_response(
                        &headers,
                        JsonRpcResponse::error(
                            raw.id,
                            JsonRpcError::new(error_codes::INVALID_REQUEST, "Invalid or expired session ID"),
                        ),
                    );
                }
                state.sessions.touch(id);
                session_id = Some(id.clone());
            }
        }
    }

    if method == "notifications/initialized" {
        if let Some(id) = &session_header {
            state.sessions.mark_initialized(id);
        }
        return StatusCode::NO_CONTENT.into_response();
    }

    let ctx = RequestContext::new(session_id.clone(), raw.id.clone());
    let response = mcprs_server::processor::process_request(&state.server.registry, &body, ctx).await;

    let Some(response) = response else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let mut new_session_id = None;
    if method == "initialize" {
        if let JsonRpcResponsePayload::Success { result } = &response.payload {
            if let (Some(sid), Some(pv)) = (
                result.get("sessionId").and_then(|v| v.as_str()),
                result.get("protocolVersion").and_then(|v| v.as_str()),
            ) {
                state
                    .sessions
                    .create(sid.to_string(), pv.to_string(), state.config.max_sessions, state.config.session_timeout);
                new_session_id = Some(sid.to_string());
            }
        }
    }

    let mut http_response = json_rpc_response(&headers, response);
    if let Some(sid) = new_session_id.or(session_id) {
        if let Ok(value) = HeaderValue::from_str(&sid) {
            http_response.headers_mut().insert("mcp-session-id", value);
        }
    }
    http_response
}

pub async fn delete_handler(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if let Err(err) = check_protocol_version(&headers) {
        return Json(err).into_response();
    }

    let Some(session_id) = header_str(&headers, SESSION_HEADER) else {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Mcp-Session-Id header required"})),
        )
            .into_response();
    };

    if !state.sessions.remove(session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    state.sse.remove_for_session(session_id);
    StatusCode::NO_CONTENT.into_response()
}

pub async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
}

/// Frame the reply as JSON, or as a single SSE `data:` event when the
/// request's `Accept` header allows `text/event-stream` (spec §4.11.2
/// step 8).
fn json_rpc_response(headers: &HeaderMap, response: JsonRpcResponse) -> Response {
    let wants_sse = header_str(headers, "accept").is_some_and(|accept| accept.contains("text/event-stream"));
    if !wants_sse {
        return Json(response).into_response();
    }

    let payload = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(Body::from(format!("data: {payload}\n\n")))
        .expect("static headers are valid")
}

fn shutting_down_error() -> JsonRpcResponse {
    JsonRpcResponse::error(
        None,
        JsonRpcError::new(error_codes::SERVER_ERROR, "Server is shutting down"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_protocol_version_defaults() {
        let headers = HeaderMap::new();
        assert_eq!(check_protocol_version(&headers).unwrap(), DEFAULT_PROTOCOL_VERSION);
    }

    #[test]
    fn unsupported_protocol_version_errors() {
        let mut headers = HeaderMap::new();
        headers.insert(PROTOCOL_VERSION_HEADER, HeaderValue::from_static("1999-01-01"));
        let err = check_protocol_version(&headers).unwrap_err();
        assert!(err.is_error());
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["error"]["code"], error_codes::SERVER_ERROR);
        assert!(v["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Unsupported protocol version"));
    }

    #[test]
    fn supported_protocol_version_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(PROTOCOL_VERSION_HEADER, HeaderValue::from_static("2025-03-26"));
        assert_eq!(check_protocol_version(&headers).unwrap(), "2025-03-26");
    }

    #[test]
    fn plain_accept_yields_json_reply() {
        let headers = HeaderMap::new();
        let response = json_rpc_response(&headers, JsonRpcResponse::success(mcprs_protocol::jsonrpc::RequestId::Number(1), json!({})));
        assert_eq!(
            response.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn sse_accept_yields_a_single_data_event() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("text/event-stream"));
        let response = json_rpc_response(&headers, JsonRpcResponse::success(mcprs_protocol::jsonrpc::RequestId::Number(1), json!({})));
        assert_eq!(
            response.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));
        let body: serde_json::Value = serde_json::from_str(text.trim_start_matches("data: ").trim_end()).unwrap();
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"], json!({}));
    }
}
