//! The `tools` capability manager: `tools/list`, `tools/call`.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use mcprs_core::{event_types, CapabilityManager, EventBus, ExecuteResult, RequestContext};
use mcprs_protocol::jsonrpc::error_codes;
use mcprs_protocol::jsonrpc::JsonRpcError;
use mcprs_protocol::types::{CallToolRequest, CallToolResult, ListToolsResult, ToolDefinition};
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::ServerError;

/// A registered tool: its wire-facing definition plus the async handler
/// invoked on `tools/call`. Handler panics/exceptions are caught by the
/// caller (`execute`) and wrapped into an `isError: true` result rather
/// than surfaced as a JSON-RPC error, per spec §4.4/§7.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<CallToolResult, String>> + Send + Sync>;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: ToolHandler,
}

#[derive(Default)]
struct Inner {
    tools: Vec<RegisteredTool>,
}

pub struct ToolsManager {
    bus: Arc<EventBus>,
    inner: RwLock<Inner>,
}

impl ToolsManager {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register a tool. Re-registering an existing name is a silent no-op
    /// and does not publish `list_changed` (spec invariant 8).
    pub fn register(&self, definition: ToolDefinition, handler: ToolHandler) {
        let mut inner = self.inner.write();
        if inner.tools.iter().any(|t| t.definition.name == definition.name) {
            return;
        }
        inner.tools.push(RegisteredTool { definition, handler });
        drop(inner);
        self.bus.publish(event_types::TOOLS_LIST_CHANGED, serde_json::json!({}));
    }

    pub fn unregister(&self, name: &str) {
        let mut inner = self.inner.write();
        let before = inner.tools.len();
        inner.tools.retain(|t| t.definition.name != name);
        let changed = inner.tools.len() != before;
        drop(inner);
        if changed {
            self.bus.publish(event_types::TOOLS_LIST_CHANGED, serde_json::json!({}));
        }
    }

    fn list(&self) -> ExecuteResult {
        let tools = self
            .inner
            .read()
            .tools
            .iter()
            .map(|t| t.definition.clone())
            .collect();
        let result = ListToolsResult { tools };
        Ok(Some(serde_json::to_value(result).unwrap()))
    }

    async fn call(&self, params: Option<Value>) -> ExecuteResult {
        let params = params.unwrap_or(Value::Null);
        let request: CallToolRequest = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?;

        let handler = {
            let inner = self.inner.read();
            inner
                .tools
                .iter()
                .find(|t| t.definition.name == request.name)
                .map(|t| t.handler.clone())
        };

        let Some(handler) = handler else {
            return Err(ServerError::ToolNotFound(request.name).into());
        };

        let result = match handler(request.arguments).await {
            Ok(result) => result,
            Err(message) => CallToolResult::error(message),
        };
        Ok(Some(serde_json::to_value(result).unwrap()))
    }
}

impl CapabilityManager for ToolsManager {
    fn name(&self) -> &str {
        "tools"
    }

    fn claims(&self, method: &str) -> bool {
        matches!(method, "tools/list" | "tools/call")
    }

    fn execute(
        &self,
        method: &str,
        params: Option<Value>,
        _ctx: &RequestContext,
    ) -> BoxFuture<'_, ExecuteResult> {
        let method = method.to_string();
        async move {
            match method.as_str() {
                "tools/list" => self.list(),
                "tools/call" => self.call(params).await,
                _ => unreachable!("claims() guards dispatch"),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcprs_protocol::types::ContentItem;
    use pretty_assertions::assert_eq;

    fn echo_tool() -> (ToolDefinition, ToolHandler) {
        let definition = ToolDefinition {
            name: "echo".into(),
            description: Some("Echoes the message argument".into()),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let handler: ToolHandler = Arc::new(|args: Value| {
            async move {
                let message = args.get("message").and_then(Value::as_str).unwrap_or("");
                Ok(CallToolResult::ok(vec![ContentItem::text(format!(
                    "Echo: {message}"
                ))]))
            }
            .boxed()
        });
        (definition, handler)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(None, None)
    }

    #[tokio::test]
    async fn call_echo_tool() {
        let manager = ToolsManager::new(Arc::new(EventBus::new()));
        let (def, handler) = echo_tool();
        manager.register(def, handler);

        let result = manager
            .execute(
                "tools/call",
                Some(serde_json::json!({"name": "echo", "arguments": {"message": "hi"}})),
                &ctx(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["text"], "Echo: hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_internal_error() {
        let manager = ToolsManager::new(Arc::new(EventBus::new()));
        let err = manager
            .execute(
                "tools/call",
                Some(serde_json::json!({"name": "nope", "arguments": {}})),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, error_codes::INTERNAL_ERROR);
        assert!(err.message.contains("Tool not found: nope"));
    }

    #[tokio::test]
    async fn tool_exception_becomes_is_error_result() {
        let manager = ToolsManager::new(Arc::new(EventBus::new()));
        let definition = ToolDefinition {
            name: "boom".into(),
            description: None,
            input_schema: serde_json::json!({}),
        };
        let handler: ToolHandler =
            Arc::new(|_| async { Err("kaboom".to_string()) }.boxed());
        manager.register(definition, handler);

        let result = manager
            .execute(
                "tools/call",
                Some(serde_json::json!({"name": "boom", "arguments": {}})),
                &ctx(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "kaboom");
    }

    #[tokio::test]
    async fn duplicate_registration_is_noop_and_no_event() {
        let bus = Arc::new(EventBus::new());
        let manager = ToolsManager::new(bus.clone());
        let (def1, handler1) = echo_tool();
        manager.register(def1, handler1);
        let consumed = Arc::new(parking_lot::Mutex::new(0));
        let consumed_clone = consumed.clone();
        bus.subscribe(
            event_types::TOOLS_LIST_CHANGED,
            Arc::new(move |_| {
                *consumed_clone.lock() += 1;
            }),
        );
        let (def2, handler2) = echo_tool();
        manager.register(def2, handler2);
        assert_eq!(*consumed.lock(), 1); // only the first registration fired
        let list = manager.execute("tools/list", None, &ctx()).await.unwrap().unwrap();
        assert_eq!(list["tools"].as_array().unwrap().len(), 1);
    }
}
