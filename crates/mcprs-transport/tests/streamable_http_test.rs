//! End-to-end tests driving the Streamable HTTP router directly with
//! `tower::ServiceExt::oneshot`, the same harness style the teacher uses in
//! `turbomcp-server`'s `http_headers_test.rs`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use mcprs_server::ServerBuilder;
use mcprs_transport::{HttpTransport, ServerConfig};
use tower::ServiceExt;

fn post(body: &str, session_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json");
    if let Some(sid) = session_id {
        builder = builder.header("mcp-session-id", sid);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn initialize_then_ping_round_trip() {
    let server = Arc::new(ServerBuilder::new("mcprs", "0.1.0").with_builtins().build());
    let router = HttpTransport::new(server, ServerConfig::default()).router();

    let init = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","clientInfo":{"name":"t","version":"1"}}}"#;
    let response = router.clone().oneshot(post(init, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert_eq!(session_id.len(), 32);
    assert!(session_id.chars().all(|c| c.is_ascii_hexdigit()));

    let value = body_json(response).await;
    assert_eq!(value["result"]["sessionId"], session_id);
    assert_eq!(value["result"]["capabilities"]["tools"]["listChanged"], true);

    let ping = r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#;
    let response = router.oneshot(post(ping, Some(&session_id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = body_json(response).await;
    assert_eq!(value["id"], 2);
    assert_eq!(value["result"], serde_json::json!({}));
}

#[tokio::test]
async fn tools_call_echo_returns_text_content() {
    let server = Arc::new(ServerBuilder::new("mcprs", "0.1.0").with_builtins().build());
    let router = HttpTransport::new(server, ServerConfig::default()).router();

    let init = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","clientInfo":{"name":"t","version":"1"}}}"#;
    let response = router.clone().oneshot(post(init, None)).await.unwrap();
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();

    let call = r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#;
    let response = router.oneshot(post(call, Some(&session_id))).await.unwrap();
    let value = body_json(response).await;
    assert_eq!(value["result"]["isError"], false);
    assert_eq!(value["result"]["content"][0]["type"], "text");
    assert_eq!(value["result"]["content"][0]["text"], "Echo: hi");
}

#[tokio::test]
async fn resource_subscription_streams_over_an_open_sse_connection() {
    let server = Arc::new(ServerBuilder::new("mcprs", "0.1.0").with_builtins().build());
    let router = HttpTransport::new(server.clone(), ServerConfig::default()).router();

    let init = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","clientInfo":{"name":"t","version":"1"}}}"#;
    let response = router.clone().oneshot(post(init, None)).await.unwrap();
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();

    let get_request = Request::builder()
        .method("GET")
        .uri("/mcp")
        .header("accept", "text/event-stream")
        .header("mcp-session-id", &session_id)
        .body(Body::empty())
        .unwrap();
    let sse_response = router.clone().oneshot(get_request).await.unwrap();
    assert_eq!(sse_response.status(), StatusCode::OK);
    assert_eq!(sse_response.headers().get("content-type").unwrap(), "text/event-stream");

    let mut stream = sse_response.into_body().into_data_stream();
    let first = stream.next().await.unwrap().unwrap();
    assert!(first.starts_with(b": sse accepted"));

    let subscribe = r#"{"jsonrpc":"2.0","id":2,"method":"resources/subscribe","params":{"uri":"time://now"}}"#;
    let response = router.oneshot(post(subscribe, Some(&session_id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    server.resources.notify_updated("time://now");

    let frame = stream.next().await.unwrap().unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.starts_with("data: "));
    let body: serde_json::Value = serde_json::from_str(text.trim_start_matches("data: ").trim_end()).unwrap();
    assert_eq!(body["method"], "notifications/resources/updated");
    assert_eq!(body["params"]["uri"], "time://now");
}

#[tokio::test]
async fn missing_session_header_is_rejected() {
    let server = Arc::new(ServerBuilder::new("mcprs", "0.1.0").with_builtins().build());
    let router = HttpTransport::new(server, ServerConfig::default()).router();

    let ping = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
    let response = router.oneshot(post(ping, None)).await.unwrap();
    let value = body_json(response).await;
    assert_eq!(value["error"]["message"], "Mcp-Session-Id header required");
}

#[tokio::test]
async fn unsupported_protocol_version_is_a_json_rpc_server_error() {
    let server = Arc::new(ServerBuilder::new("mcprs", "0.1.0").with_builtins().build());
    let router = HttpTransport::new(server, ServerConfig::default()).router();

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("mcp-protocol-version", "1999-01-01")
        .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = body_json(response).await;
    assert_eq!(value["error"]["code"], -32000);
    assert!(value["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Unsupported protocol version"));
}

#[tokio::test]
async fn requests_during_shutdown_get_a_server_error() {
    let server = Arc::new(ServerBuilder::new("mcprs", "0.1.0").with_builtins().build());
    let transport = HttpTransport::new(server, ServerConfig::default());
    let shutdown = transport.shutdown_handle();
    let router = transport.router();

    let init = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","clientInfo":{"name":"t","version":"1"}}}"#;
    let response = router.clone().oneshot(post(init, None)).await.unwrap();
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();

    shutdown.begin_shutdown();

    let ping = r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#;
    let response = router.oneshot(post(ping, Some(&session_id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = body_json(response).await;
    assert_eq!(value["error"]["code"], -32000);
    assert_eq!(value["error"]["message"], "Server is shutting down");
}

#[tokio::test]
async fn unknown_path_is_404() {
    let server = Arc::new(ServerBuilder::new("mcprs", "0.1.0").build());
    let router = HttpTransport::new(server, ServerConfig::default()).router();

    let request = Request::builder()
        .method("GET")
        .uri("/not-mcp")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_without_session_header_is_forbidden() {
    let server = Arc::new(ServerBuilder::new("mcprs", "0.1.0").build());
    let router = HttpTransport::new(server, ServerConfig::default()).router();

    let request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_unknown_session_is_not_found() {
    let server = Arc::new(ServerBuilder::new("mcprs", "0.1.0").build());
    let router = HttpTransport::new(server, ServerConfig::default()).router();

    let request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header("mcp-session-id", "deadbeef")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
