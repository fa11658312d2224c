//! Streamable HTTP + SSE transport (spec §4.11): a single endpoint path
//! multiplexing `OPTIONS`/`GET`/`POST`/`DELETE`, backed by a session table
//! and an SSE connection table, with a background keepalive loop and a
//! graceful shutdown sequence.

pub mod router;
pub mod session;
pub mod sse;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use mcprs_core::{event_types, notification_envelope};
use mcprs_server::McpServer;
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::TransportError;
use crate::shutdown::{wait_for_shutdown_signal, ShutdownState};

use router::{delete_handler, fallback_404, get_handler, options_handler, post_handler, HttpState};
use session::SessionTable;
use sse::SseConnections;

/// Owns the session/SSE bookkeeping and drives the axum server to
/// completion, including the keepalive loop and graceful shutdown.
pub struct HttpTransport {
    state: HttpState,
}

impl HttpTransport {
    pub fn new(server: Arc<McpServer>, config: ServerConfig) -> Self {
        let config = Arc::new(config);
        let sessions = Arc::new(SessionTable::new());
        let sse = Arc::new(SseConnections::new(config.max_sse_connections));
        let shutdown = Arc::new(ShutdownState::default());

        subscribe_notifications(&server.bus, sse.clone());

        Self {
            state: HttpState {
                server,
                config,
                sessions,
                sse,
                shutdown,
            },
        }
    }

    pub fn shutdown_handle(&self) -> Arc<ShutdownState> {
        self.state.shutdown.clone()
    }

    /// Build the axum `Router` without binding or serving it — exposed so a
    /// caller can embed the MCP endpoint into a larger `axum` app, or drive
    /// it directly with `tower::ServiceExt::oneshot` in tests.
    pub fn router(&self) -> Router {
        let middleware = ServiceBuilder::new().layer(TraceLayer::new_for_http());
        let router = Router::new()
            .route(
                &self.state.config.endpoint_path,
                get(get_handler)
                    .post(post_handler)
                    .delete(delete_handler)
                    .options(options_handler),
            )
            .fallback(fallback_404);

        let router = match &self.state.config.cors {
            Some(cors) => router
                .layer(middleware::from_fn_with_state(self.state.config.clone(), reject_disallowed_origin))
                .layer(middleware.layer(cors_layer(cors))),
            None => router.layer(middleware),
        };

        router.with_state(self.state.clone())
    }

    /// Bind the listener and serve until `shutdown_handle().begin_shutdown()`
    /// is called and in-flight requests drain (or the drain timeout elapses).
    pub async fn run(self) -> Result<(), TransportError> {
        let addr = self.state.config.bind_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::BindFailed { addr: addr.clone(), source })?;
        info!("mcprs http transport listening on {addr}");

        let keepalive_sse = self.state.sse.clone();
        let keepalive_interval = self.state.config.keepalive_interval;
        let keepalive_shutdown = self.state.shutdown.clone();
        let keepalive_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(keepalive_interval);
            loop {
                ticker.tick().await;
                if keepalive_shutdown.is_shutting_down() {
                    break;
                }
                keepalive_sse.tick_keepalive(keepalive_interval);
            }
        });

        let app = self.router();
        let shutdown = self.state.shutdown.clone();
        let bus = self.state.server.bus.clone();
        let sse = self.state.sse.clone();
        let graceful_timeout = self.state.config.graceful_shutdown_timeout;
        let graceful_poll = self.state.config.graceful_shutdown_poll;

        let serve_result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                wait_for_shutdown_signal().await;
                shutdown.begin_shutdown();
                bus.publish(event_types::SHUTDOWN, json!({"reason": "server_shutdown"}));
                sse.broadcast(None, r#"{"method":"notifications/shutdown","params":{"reason":"server_shutdown"}}"#);
                if !shutdown.wait_for_drain(graceful_timeout, graceful_poll).await {
                    warn!("graceful shutdown timed out with requests still in flight");
                }
            })
            .await;

        keepalive_task.abort();
        serve_result.map_err(TransportError::Io)
    }
}

/// Subscribe to every bus event type that maps onto a spontaneous
/// notification and fan each one out to every live SSE connection (spec
/// §2 "subscribed HTTP transport fan-outs an SSE frame to every live
/// connection"; resource subscriptions are tracked as a global ref count,
/// not per-session, so there is no narrower audience to target).
fn subscribe_notifications(bus: &mcprs_core::EventBus, sse: Arc<SseConnections>) {
    for &event_type in event_types::NOTIFICATION_EVENT_TYPES {
        let sse = sse.clone();
        let method = event_type.to_string();
        bus.subscribe(
            event_type,
            Arc::new(move |params| {
                let envelope = notification_envelope(&method, params.clone());
                sse.broadcast(None, &envelope.to_string());
            }),
        );
    }
}

/// Reject a request carrying an `Origin` header not on the allow-list with
/// `403` (spec §4.11/§6.2); `CorsLayer` alone only omits the
/// `access-control-allow-origin` header for a disallowed origin, it never
/// refuses the request.
async fn reject_disallowed_origin(
    State(config): State<Arc<ServerConfig>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(cors) = &config.cors {
        if let Some(origin) = req.headers().get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok()) {
            if !cors.is_allowed(origin) {
                return StatusCode::FORBIDDEN.into_response();
            }
        }
    }
    next.run(req).await
}

fn cors_layer(cors: &crate::config::CorsConfig) -> CorsLayer {
    let allow_origin = if cors.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = cors
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::DELETE, http::Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcprs_server::ServerBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn router_builds_without_panicking() {
        let server = Arc::new(ServerBuilder::new("demo", "0.1.0").with_builtins().build());
        let transport = HttpTransport::new(server, ServerConfig::default());
        let _router = transport.router();
        assert_eq!(transport.state.sse.len(), 0);
    }

    #[tokio::test]
    async fn resource_update_fans_out_to_open_sse_connections() {
        let server = Arc::new(ServerBuilder::new("demo", "0.1.0").build());
        let transport = HttpTransport::new(server.clone(), ServerConfig::default());
        let (_handle, mut rx) = transport.state.sse.register(Some("s1".into())).unwrap();

        server.resources.notify_updated("time://now");
        assert!(rx.try_recv().is_err(), "no subscribers yet, nothing should fan out");

        let (def, reader) = mcprs_server::builtins::time_resource();
        server.resources.register_resource(def, reader);
        server
            .handle(
                r#"{"jsonrpc":"2.0","id":1,"method":"resources/subscribe","params":{"uri":"time://now"}}"#,
                mcprs_core::RequestContext::new(None, None),
            )
            .await;

        server.resources.notify_updated("time://now");
        let frame = rx.try_recv().expect("subscribed resource update should fan out");
        assert!(frame.starts_with("data: "));
        let body = frame.trim_start_matches("data: ").trim_end();
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["method"], "notifications/resources/updated");
        assert_eq!(value["params"]["uri"], "time://now");
    }
}
