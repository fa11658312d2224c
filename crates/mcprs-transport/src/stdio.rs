//! Newline-delimited JSON-RPC over stdin/stdout (spec §4.10).
//!
//! All logging goes to stderr via `tracing` — stdout carries only JSON-RPC
//! frames, matching the teacher's stdio transport discipline.

use std::sync::Arc;

use futures::StreamExt;
use mcprs_core::{event_types, notification_envelope, RequestContext};
use mcprs_protocol::jsonrpc::{error_codes, JsonRpcError, JsonRpcResponse};
use mcprs_server::McpServer;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, error, trace, warn};

use crate::shutdown::{wait_for_shutdown_signal, ShutdownState, DEFAULT_DRAIN_POLL, DEFAULT_DRAIN_TIMEOUT};

/// Drive the stdio transport to completion: read one JSON-RPC message per
/// line until end-of-stream or a shutdown signal, writing exactly one
/// reply per non-notification line. Concurrently, server-initiated
/// notifications published on the event bus are written to the same
/// stream as they arrive (spec §2: "stdio transport writes to its single
/// stream"). On `Ctrl-C`/`SIGTERM` the transport enters `shuttingDown`,
/// rejects further requests with `-32000` (spec §4.10), waits up to 5s for
/// the in-flight request to drain, then exits.
pub async fn run(server: Arc<McpServer>, shutdown: Arc<ShutdownState>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut reader = FramedRead::new(BufReader::new(stdin), LinesCodec::new());
    let stdout = Arc::new(Mutex::new(tokio::io::stdout()));

    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<String>();
    subscribe_notifications(&server.bus, notify_tx);

    let (exit_tx, mut exit_rx) = oneshot::channel();
    let signal_shutdown = shutdown.clone();
    let signal_bus = server.bus.clone();
    let signal_stdout = stdout.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_shutdown.begin_shutdown();
        signal_bus.publish(event_types::SHUTDOWN, serde_json::json!({"reason": "server_shutdown"}));
        write_line(
            &signal_stdout,
            r#"{"jsonrpc":"2.0","method":"notifications/shutdown","params":{"reason":"server_shutdown"}}"#,
        )
        .await;
        if !signal_shutdown.wait_for_drain(DEFAULT_DRAIN_TIMEOUT, DEFAULT_DRAIN_POLL).await {
            warn!("graceful shutdown timed out with a request still in flight");
        }
        let _ = exit_tx.send(());
    });

    loop {
        tokio::select! {
            line = reader.next() => {
                let Some(line) = line else { break };
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!("stdio read error: {e}");
                        break;
                    }
                };

                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let response = if shutdown.is_shutting_down() {
                    Some(shutting_down_response(line))
                } else {
                    let _guard = shutdown.track_request();
                    let ctx = RequestContext::new(None, None);
                    mcprs_server::processor::process_request(&server.registry, line, ctx).await
                };

                match response {
                    Some(response) => {
                        let Ok(json) = serde_json::to_string(&response) else {
                            error!("failed to serialize response");
                            continue;
                        };
                        if !write_line(&stdout, &json).await {
                            break;
                        }
                    }
                    None => trace!("no reply for notification"),
                }
            }
            Some(json) = notify_rx.recv() => {
                if !write_line(&stdout, &json).await {
                    break;
                }
            }
            _ = &mut exit_rx => {
                debug!("stdio transport drain complete, exiting");
                break;
            }
        }
    }

    debug!("stdio transport reader reached end of stream");
    Ok(())
}

async fn write_line(stdout: &Arc<Mutex<tokio::io::Stdout>>, json: &str) -> bool {
    let mut stdout = stdout.lock().await;
    if let Err(e) = stdout.write_all(json.as_bytes()).await {
        error!("stdio write error: {e}");
        return false;
    }
    if let Err(e) = stdout.write_all(b"\n").await {
        error!("stdio write error: {e}");
        return false;
    }
    if let Err(e) = stdout.flush().await {
        error!("stdio flush error: {e}");
        return false;
    }
    true
}

fn subscribe_notifications(bus: &mcprs_core::EventBus, tx: mpsc::UnboundedSender<String>) {
    for &event_type in event_types::NOTIFICATION_EVENT_TYPES {
        let tx = tx.clone();
        let method = event_type.to_string();
        bus.subscribe(
            event_type,
            Arc::new(move |params| {
                let envelope = notification_envelope(&method, params.clone());
                let _ = tx.send(envelope.to_string());
            }),
        );
    }
}

fn shutting_down_response(line: &str) -> JsonRpcResponse {
    let id = serde_json::from_str::<mcprs_protocol::jsonrpc::RawMessage>(line)
        .ok()
        .and_then(|m| m.id);
    JsonRpcResponse::error(
        id,
        JsonRpcError::new(error_codes::SERVER_ERROR, "Server is shutting down"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcprs_server::ServerBuilder;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn shutting_down_response_carries_server_error_code() {
        let response = shutting_down_response(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
        assert!(response.is_error());
        let v = serde_json::to_value(&response).unwrap();
        assert_eq!(v["error"]["code"], error_codes::SERVER_ERROR);
        assert_eq!(v["error"]["message"], "Server is shutting down");
    }

    #[tokio::test]
    async fn subscribed_notification_is_forwarded_as_an_envelope() {
        let server = ServerBuilder::new("demo", "0.1.0").build();
        let (tx, mut rx) = mpsc::unbounded_channel();
        subscribe_notifications(&server.bus, tx);

        let (def, reader) = mcprs_server::builtins::time_resource();
        server.resources.register_resource(def, reader);
        server
            .handle(
                r#"{"jsonrpc":"2.0","id":1,"method":"resources/subscribe","params":{"uri":"time://now"}}"#,
                RequestContext::new(None, None),
            )
            .await;

        server.resources.notify_updated("time://now");
        let json = rx.try_recv().expect("subscribed update should be forwarded");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "notifications/resources/updated");
        assert_eq!(value["params"]["uri"], "time://now");
    }

    #[tokio::test]
    async fn processor_reachable_through_builder() {
        let server = ServerBuilder::new("demo", "0.1.0").with_builtins().build();
        let shutdown = Arc::new(ShutdownState::default());
        assert!(!shutdown.is_shutting_down());
        let ctx = RequestContext::new(None, None);
        let response = mcprs_server::processor::process_request(
            &server.registry,
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            ctx,
        )
        .await
        .unwrap();
        assert!(!response.is_error());
    }
}
