//! The `prompts` capability manager: `prompts/list`, `prompts/get`.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use mcprs_core::{event_types, CapabilityManager, EventBus, ExecuteResult, RequestContext};
use mcprs_protocol::jsonrpc::{error_codes, JsonRpcError};
use mcprs_protocol::types::{
    GetPromptRequest, GetPromptResult, ListPromptsResult, PromptDefinition, PromptMessage,
};
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::ServerError;

pub type PromptBuilder =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Vec<PromptMessage>, String>> + Send + Sync>;

struct RegisteredPrompt {
    definition: PromptDefinition,
    builder: PromptBuilder,
}

#[derive(Default)]
struct Inner {
    prompts: Vec<RegisteredPrompt>,
}

pub struct PromptsManager {
    bus: Arc<EventBus>,
    inner: RwLock<Inner>,
}

impl PromptsManager {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn register(&self, definition: PromptDefinition, builder: PromptBuilder) {
        let mut inner = self.inner.write();
        if inner.prompts.iter().any(|p| p.definition.name == definition.name) {
            return;
        }
        inner.prompts.push(RegisteredPrompt { definition, builder });
        drop(inner);
        self.bus
            .publish(event_types::PROMPTS_LIST_CHANGED, serde_json::json!({}));
    }

    pub fn unregister(&self, name: &str) {
        let mut inner = self.inner.write();
        let before = inner.prompts.len();
        inner.prompts.retain(|p| p.definition.name != name);
        let changed = inner.prompts.len() != before;
        drop(inner);
        if changed {
            self.bus
                .publish(event_types::PROMPTS_LIST_CHANGED, serde_json::json!({}));
        }
    }

    fn list(&self) -> ExecuteResult {
        let prompts = self
            .inner
            .read()
            .prompts
            .iter()
            .map(|p| p.definition.clone())
            .collect();
        let result = ListPromptsResult { prompts };
        Ok(Some(serde_json::to_value(result).unwrap()))
    }

    async fn get(&self, params: Option<Value>) -> ExecuteResult {
        let params = params.unwrap_or(Value::Null);
        let request: GetPromptRequest = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?;

        let found = {
            let inner = self.inner.read();
            inner
                .prompts
                .iter()
                .find(|p| p.definition.name == request.name)
                .map(|p| (p.definition.description.clone(), p.builder.clone()))
        };

        let Some((description, builder)) = found else {
            return Err(ServerError::PromptNotFound(request.name).into());
        };

        let messages = builder(request.arguments)
            .await
            .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e))?;

        let result = GetPromptResult {
            description,
            messages,
        };
        Ok(Some(serde_json::to_value(result).unwrap()))
    }
}

impl CapabilityManager for PromptsManager {
    fn name(&self) -> &str {
        "prompts"
    }

    fn claims(&self, method: &str) -> bool {
        matches!(method, "prompts/list" | "prompts/get")
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
                "prompts/list" => self.list(),
                "prompts/get" => self.get(params).await,
                _ => unreachable!("claims() guards dispatch"),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcprs_protocol::types::{ContentItem, Role};
    use pretty_assertions::assert_eq;

    fn ctx() -> RequestContext {
        RequestContext::new(None, None)
    }

    fn greeting_prompt() -> (PromptDefinition, PromptBuilder) {
        let definition = PromptDefinition {
            name: "greeting".into(),
            description: Some("Say hello to someone".into()),
            arguments: Some(vec![]),
        };
        let builder: PromptBuilder = Arc::new(|args: Value| {
            async move {
                let name = args.get("name").and_then(Value::as_str).unwrap_or("there");
                Ok(vec![PromptMessage {
                    role: Role::User,
                    content: vec![ContentItem::text(format!("Hello, {name}!"))],
                }])
            }
            .boxed()
        });
        (definition, builder)
    }

    #[tokio::test]
    async fn get_unknown_prompt_errors() {
        let manager = PromptsManager::new(Arc::new(EventBus::new()));
        let err = manager
            .execute(
                "prompts/get",
                Some(serde_json::json!({"name": "nope"})),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("Prompt not found: nope"));
    }

    #[tokio::test]
    async fn get_builds_messages() {
        let manager = PromptsManager::new(Arc::new(EventBus::new()));
        let (def, builder) = greeting_prompt();
        manager.register(def, builder);

        let result = manager
            .execute(
                "prompts/get",
                Some(serde_json::json!({"name": "greeting", "arguments": {"name": "Ada"}})),
                &ctx(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["messages"][0]["role"], "user");
        assert_eq!(result["messages"][0]["content"][0]["text"], "Hello, Ada!");
    }
}
