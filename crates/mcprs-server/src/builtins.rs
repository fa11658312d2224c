//! Trivial example tool/resource/prompt used to exercise the manager
//! plumbing end to end. Not a meaningful product surface — analogous to the
//! teacher's own demo handlers.

use futures::FutureExt;
use mcprs_protocol::types::{
    ContentItem, PromptDefinition, PromptMessage, ResourceContentKind, ResourceDefinition, Role,
};

use crate::managers::prompts::PromptBuilder;
use crate::managers::resources::ResourceReader;
use crate::managers::tools::ToolHandler;

pub fn echo_tool() -> (mcprs_protocol::types::ToolDefinition, ToolHandler) {
    let definition = mcprs_protocol::types::ToolDefinition {
        name: "echo".into(),
        description: Some("Echoes the provided message back as text".into()),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"],
        }),
    };
    let handler: ToolHandler = std::sync::Arc::new(|args| {
        async move {
            let message = args.get("message").and_then(serde_json::Value::as_str).unwrap_or("");
            Ok(mcprs_protocol::types::CallToolResult::ok(vec![ContentItem::text(format!(
                "Echo: {message}"
            ))]))
        }
        .boxed()
    });
    (definition, handler)
}

pub fn time_resource() -> (ResourceDefinition, ResourceReader) {
    let definition = ResourceDefinition {
        uri: "time://now".into(),
        name: "time".into(),
        description: Some("The server's current UTC time".into()),
        mime_type: Some("text/plain".into()),
    };
    let reader: ResourceReader = std::sync::Arc::new(|| {
        async { Ok(ResourceContentKind::Text(chrono::Utc::now().to_rfc3339())) }.boxed()
    });
    (definition, reader)
}

pub fn greeting_prompt() -> (PromptDefinition, PromptBuilder) {
    let definition = PromptDefinition {
        name: "greeting".into(),
        description: Some("Say hello to someone by name".into()),
        arguments: Some(vec![mcprs_protocol::types::PromptArgumentDefinition {
            name: "name".into(),
            description: Some("Who to greet".into()),
            required: false,
        }]),
    };
    let builder: PromptBuilder = std::sync::Arc::new(|args| {
        async move {
            let name = args
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("there");
            Ok(vec![PromptMessage {
                role: Role::User,
                content: vec![ContentItem::text(format!("Hello, {name}!"))],
            }])
        }
        .boxed()
    });
    (definition, builder)
}
