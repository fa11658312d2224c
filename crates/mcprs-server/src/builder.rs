//! Assembles the shared event bus, the six capability managers, and the
//! registry that routes between them, then hands the wired bundle to a
//! transport.

use std::sync::Arc;

use mcprs_core::{CapabilityRegistry, EventBus};
use mcprs_protocol::types::{
    PromptDefinition, ResourceDefinition, ResourceTemplateDefinition, ToolDefinition,
};

use crate::managers::completion::{CompletionManager, CompletionProvider};
use crate::managers::prompts::{PromptBuilder, PromptsManager};
use crate::managers::resources::{ResourceReader, ResourcesManager};
use crate::managers::tools::{ToolHandler, ToolsManager};
use crate::managers::CoreManager;
use crate::managers::LoggingManager;
use crate::{builtins, processor};

/// The fully wired server: the shared bus, every capability manager (kept
/// individually addressable so callers can push notifications or inspect
/// state), and the registry a transport dispatches through.
pub struct McpServer {
    pub bus: Arc<EventBus>,
    pub registry: Arc<CapabilityRegistry>,
    pub core: Arc<CoreManager>,
    pub tools: Arc<ToolsManager>,
    pub resources: Arc<ResourcesManager>,
    pub prompts: Arc<PromptsManager>,
    pub logging: Arc<LoggingManager>,
    pub completion: Arc<CompletionManager>,
}

impl McpServer {
    pub async fn handle(
        &self,
        raw: &str,
        ctx: mcprs_core::RequestContext,
    ) -> Option<mcprs_protocol::jsonrpc::JsonRpcResponse> {
        processor::process_request(&self.registry, raw, ctx).await
    }
}

pub struct ServerBuilder {
    name: String,
    version: String,
    bus: Arc<EventBus>,
    tools: Vec<(ToolDefinition, ToolHandler)>,
    resources: Vec<(ResourceDefinition, ResourceReader)>,
    templates: Vec<ResourceTemplateDefinition>,
    prompts: Vec<(PromptDefinition, PromptBuilder)>,
    completion_provider: Option<CompletionProvider>,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            bus: Arc::new(EventBus::new()),
            tools: Vec::new(),
            resources: Vec::new(),
            templates: Vec::new(),
            prompts: Vec::new(),
            completion_provider: None,
        }
    }

    pub fn tool(mut self, definition: ToolDefinition, handler: ToolHandler) -> Self {
        self.tools.push((definition, handler));
        self
    }

    pub fn resource(mut self, definition: ResourceDefinition, reader: ResourceReader) -> Self {
        self.resources.push((definition, reader));
        self
    }

    pub fn resource_template(mut self, template: ResourceTemplateDefinition) -> Self {
        self.templates.push(template);
        self
    }

    pub fn prompt(mut self, definition: PromptDefinition, builder: PromptBuilder) -> Self {
        self.prompts.push((definition, builder));
        self
    }

    pub fn completion_provider(mut self, provider: CompletionProvider) -> Self {
        self.completion_provider = Some(provider);
        self
    }

    /// Registers the trivial `echo` tool, `time://now` resource, and
    /// `greeting` prompt — useful for smoke tests and quickstarts.
    pub fn with_builtins(mut self) -> Self {
        let (def, handler) = builtins::echo_tool();
        self.tools.push((def, handler));
        let (def, reader) = builtins::time_resource();
        self.resources.push((def, reader));
        let (def, builder) = builtins::greeting_prompt();
        self.prompts.push((def, builder));
        self
    }

    pub fn build(self) -> McpServer {
        let bus = self.bus;
        let core = Arc::new(CoreManager::new(bus.clone(), self.name, self.version));
        let tools = Arc::new(ToolsManager::new(bus.clone()));
        let resources = Arc::new(ResourcesManager::new(bus.clone()));
        let prompts = Arc::new(PromptsManager::new(bus.clone()));
        let logging = Arc::new(LoggingManager::new(bus.clone()));
        let completion = Arc::new(CompletionManager::new());

        for (definition, handler) in self.tools {
            tools.register(definition, handler);
        }
        for (definition, reader) in self.resources {
            resources.register_resource(definition, reader);
        }
        for template in self.templates {
            resources.register_template(template);
        }
        for (definition, builder) in self.prompts {
            prompts.register(definition, builder);
        }
        if let Some(provider) = self.completion_provider {
            completion.set_provider(provider);
        }

        let mut registry = CapabilityRegistry::new();
        registry.register(core.clone());
        registry.register(tools.clone());
        registry.register(resources.clone());
        registry.register(prompts.clone());
        registry.register(logging.clone());
        registry.register(completion.clone());

        McpServer {
            bus,
            registry: Arc::new(registry),
            core,
            tools,
            resources,
            prompts,
            logging,
            completion,
        }
    }
}
