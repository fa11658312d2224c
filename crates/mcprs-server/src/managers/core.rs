//! The `core` capability manager: `initialize`, `ping`,
//! `notifications/initialized`, `notifications/cancelled`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use mcprs_core::{event_types, CapabilityManager, EventBus, ExecuteResult, RequestContext};
use mcprs_protocol::jsonrpc::{error_codes, JsonRpcError, RequestId};
use mcprs_protocol::session::SessionId;
use mcprs_protocol::types::{Implementation, InitializeResult, ServerCapabilities};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::ServerError;

/// Request id plus optional human-readable reason, as carried by
/// `notifications/cancelled`.
#[derive(Debug, Clone)]
pub struct CancelledEntry {
    pub reason: Option<String>,
}

/// Set of cancelled request ids. Add-only (matching spec §3): entries are
/// never removed automatically, only via explicit [`CancelledRequests::clear`].
#[derive(Default)]
pub struct CancelledRequests {
    inner: Mutex<HashMap<RequestId, CancelledEntry>>,
}

impl CancelledRequests {
    pub fn mark(&self, id: RequestId, reason: Option<String>) {
        self.inner.lock().insert(id, CancelledEntry { reason });
    }

    pub fn is_cancelled(&self, id: &RequestId) -> bool {
        self.inner.lock().contains_key(id)
    }

    pub fn clear(&self, id: &RequestId) {
        self.inner.lock().remove(id);
    }
}

fn session_key(ctx: &RequestContext) -> String {
    ctx.session_id.clone().unwrap_or_default()
}

pub struct CoreManager {
    bus: Arc<EventBus>,
    server_info: Implementation,
    initialized_sessions: Mutex<HashSet<String>>,
    pub cancelled: Arc<CancelledRequests>,
}

impl CoreManager {
    pub fn new(bus: Arc<EventBus>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bus,
            server_info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            initialized_sessions: Mutex::new(HashSet::new()),
            cancelled: Arc::new(CancelledRequests::default()),
        }
    }

    pub fn is_session_initialized(&self, key: &str) -> bool {
        self.initialized_sessions.lock().contains(key)
    }

    fn initialize(&self) -> ExecuteResult {
        let session_id = SessionId::generate();
        let result = InitializeResult {
            protocol_version: mcprs_protocol::types::LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::full(),
            session_id: session_id.to_string(),
            server_info: self.server_info.clone(),
        };
        Ok(Some(serde_json::to_value(result).unwrap()))
    }

    fn mark_initialized(&self, ctx: &RequestContext) -> ExecuteResult {
        self.initialized_sessions.lock().insert(session_key(ctx));
        Ok(None)
    }

    fn cancelled_notification(&self, params: Option<Value>) -> ExecuteResult {
        let params = params.ok_or_else(|| {
            JsonRpcError::new(error_codes::INVALID_PARAMS, "missing cancellation params")
        })?;
        let request_id: RequestId = serde_json::from_value(
            params
                .get("requestId")
                .cloned()
                .ok_or_else(|| JsonRpcError::new(error_codes::INVALID_PARAMS, "missing requestId"))?,
        )
        .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?;
        let reason = params
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.cancelled.mark(request_id, reason);
        self.bus.publish(event_types::CANCELLED, params);
        Ok(None)
    }
}

impl CapabilityManager for CoreManager {
    fn name(&self) -> &str {
        "core"
    }

    fn claims(&self, method: &str) -> bool {
        matches!(
            method,
            "initialize" | "ping" | "notifications/initialized" | "notifications/cancelled"
        )
    }

    fn execute(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &RequestContext,
    ) -> BoxFuture<'_, ExecuteResult> {
        let result = match method {
            "initialize" => self.initialize(),
            "ping" => Ok(Some(serde_json::json!({}))),
            "notifications/initialized" => self.mark_initialized(ctx),
            "notifications/cancelled" => self.cancelled_notification(params),
            _ => Err(ServerError::Internal(format!("core manager cannot handle {method}")).into()),
        };
        async move { result }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> RequestContext {
        RequestContext::new(Some("s1".into()), Some(RequestId::Number(1)))
    }

    #[tokio::test]
    async fn initialize_returns_hex_session_id() {
        let manager = CoreManager::new(Arc::new(EventBus::new()), "demo", "0.1.0");
        let result = manager
            .execute("initialize", None, &ctx())
            .await
            .unwrap()
            .unwrap();
        let sid = result["sessionId"].as_str().unwrap();
        assert_eq!(sid.len(), 32);
        assert!(result["capabilities"]["tools"]["listChanged"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let manager = CoreManager::new(Arc::new(EventBus::new()), "demo", "0.1.0");
        let result = manager.execute("ping", None, &ctx()).await.unwrap();
        assert_eq!(result, Some(serde_json::json!({})));
    }

    #[tokio::test]
    async fn initialized_notification_has_no_reply() {
        let manager = CoreManager::new(Arc::new(EventBus::new()), "demo", "0.1.0");
        let result = manager
            .execute("notifications/initialized", None, &ctx())
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(manager.is_session_initialized("s1"));
    }

    #[tokio::test]
    async fn cancelled_notification_records_and_republishes() {
        let bus = Arc::new(EventBus::new());
        let manager = CoreManager::new(bus.clone(), "demo", "0.1.0");
        let params = serde_json::json!({"requestId": 5, "reason": "timeout"});
        manager
            .execute("notifications/cancelled", Some(params), &ctx())
            .await
            .unwrap();
        assert!(manager.cancelled.is_cancelled(&RequestId::Number(5)));
        assert_eq!(bus.pending_count(event_types::CANCELLED), 1);
    }
}
