//! The `resources` capability manager: listing (paginated), reading,
//! templates, and reference-counted subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::future::BoxFuture;
use futures::FutureExt;
use mcprs_core::{event_types, CapabilityManager, EventBus, ExecuteResult, RequestContext};
use mcprs_protocol::jsonrpc::{error_codes, JsonRpcError};
use mcprs_protocol::types::{
    ListResourceTemplatesResult, ListResourcesRequest, ListResourcesResult, ReadResourceRequest,
    ReadResourceResult, ResourceContentKind, ResourceContents, ResourceDefinition,
    ResourceTemplateDefinition, SubscribeRequest, UnsubscribeRequest,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::ServerError;

const DEFAULT_PAGE_LIMIT: i64 = 100;

pub type ResourceReader =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ResourceContentKind, String>> + Send + Sync>;

struct RegisteredResource {
    definition: ResourceDefinition,
    reader: ResourceReader,
}

#[derive(Default)]
struct Inner {
    resources: Vec<RegisteredResource>,
    templates: Vec<ResourceTemplateDefinition>,
    /// URI -> reference count. A URI is subscribed while its count is >= 1.
    subscriptions: HashMap<String, u64>,
}

pub struct ResourcesManager {
    bus: Arc<EventBus>,
    inner: RwLock<Inner>,
    /// Serializes subscribe/unsubscribe so ref-counting is race-free
    /// (spec §4.5 "Edge policies").
    sub_lock: Mutex<()>,
}

impl ResourcesManager {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            inner: RwLock::new(Inner::default()),
            sub_lock: Mutex::new(()),
        }
    }

    pub fn register_resource(&self, definition: ResourceDefinition, reader: ResourceReader) {
        let mut inner = self.inner.write();
        if inner.resources.iter().any(|r| r.definition.uri == definition.uri) {
            return;
        }
        inner.resources.push(RegisteredResource { definition, reader });
        drop(inner);
        self.bus
            .publish(event_types::RESOURCES_LIST_CHANGED, serde_json::json!({}));
    }

    pub fn unregister_resource(&self, uri: &str) {
        let mut inner = self.inner.write();
        let before = inner.resources.len();
        inner.resources.retain(|r| r.definition.uri != uri);
        let changed = inner.resources.len() != before;
        drop(inner);
        if changed {
            self.bus
                .publish(event_types::RESOURCES_LIST_CHANGED, serde_json::json!({}));
        }
    }

    pub fn register_template(&self, template: ResourceTemplateDefinition) {
        let mut inner = self.inner.write();
        if inner
            .templates
            .iter()
            .any(|t| t.uri_template == template.uri_template)
        {
            return;
        }
        inner.templates.push(template);
        drop(inner);
        self.bus
            .publish(event_types::RESOURCES_LIST_CHANGED, serde_json::json!({}));
    }

    /// Publish `notifications/resources/updated` for `uri` iff it currently
    /// has at least one active subscriber; otherwise this is a no-op
    /// (spec invariant 3).
    pub fn notify_updated(&self, uri: &str) {
        let subscribed = self
            .inner
            .read()
            .subscriptions
            .get(uri)
            .is_some_and(|count| *count > 0);
        if subscribed {
            self.bus
                .publish(event_types::RESOURCES_UPDATED, serde_json::json!({"uri": uri}));
        }
    }

    fn list(&self, params: Option<Value>) -> ExecuteResult {
        let request: ListResourcesRequest = match params {
            Some(v) if !v.is_null() => serde_json::from_value(v)
                .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?,
            _ => ListResourcesRequest::default(),
        };

        let inner = self.inner.read();
        let total = inner.resources.len();

        let start = match request.cursor.as_deref() {
            None | Some("") => 0,
            Some(cursor) => cursor.parse::<usize>().unwrap_or(total).min(total),
        };
        let limit = match request.limit {
            Some(n) if n > 0 => n as usize,
            _ => DEFAULT_PAGE_LIMIT as usize,
        };
        let end = (start + limit).min(total);

        let resources = inner.resources[start..end]
            .iter()
            .map(|r| r.definition.clone())
            .collect();
        let next_cursor = if end < total {
            Some(end.to_string())
        } else {
            None
        };

        let result = ListResourcesResult {
            resources,
            next_cursor,
        };
        Ok(Some(serde_json::to_value(result).unwrap()))
    }

    async fn read(&self, params: Option<Value>) -> ExecuteResult {
        let params = params.unwrap_or(Value::Null);
        let request: ReadResourceRequest = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?;

        let found = {
            let inner = self.inner.read();
            inner
                .resources
                .iter()
                .find(|r| r.definition.uri == request.uri)
                .map(|r| (r.definition.clone(), r.reader.clone()))
        };

        let Some((definition, reader)) = found else {
            return Err(ServerError::ResourceNotFound(request.uri).into());
        };

        let content = reader()
            .await
            .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e))?;

        let contents = match content {
            ResourceContentKind::Text(text) => ResourceContents {
                uri: definition.uri,
                mime_type: definition.mime_type,
                text: Some(text),
                blob: None,
            },
            ResourceContentKind::Blob(bytes) => ResourceContents {
                uri: definition.uri,
                mime_type: definition.mime_type,
                text: None,
                blob: Some(BASE64.encode(bytes)),
            },
        };

        let result = ReadResourceResult {
            contents: vec![contents],
        };
        Ok(Some(serde_json::to_value(result).unwrap()))
    }

    fn list_templates(&self) -> ExecuteResult {
        let templates = self.inner.read().templates.clone();
        let result = ListResourceTemplatesResult {
            resource_templates: templates,
        };
        Ok(Some(serde_json::to_value(result).unwrap()))
    }

    fn subscribe(&self, params: Option<Value>) -> ExecuteResult {
        let params = params.unwrap_or(Value::Null);
        let request: SubscribeRequest = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?;

        let _guard = self.sub_lock.lock();
        let exists = self
            .inner
            .read()
            .resources
            .iter()
            .any(|r| r.definition.uri == request.uri);
        if !exists {
            return Err(ServerError::ResourceNotFound(request.uri).into());
        }
        *self
            .inner
            .write()
            .subscriptions
            .entry(request.uri)
            .or_insert(0) += 1;
        Ok(Some(serde_json::json!({})))
    }

    fn unsubscribe(&self, params: Option<Value>) -> ExecuteResult {
        let params = params.unwrap_or(Value::Null);
        let request: UnsubscribeRequest = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?;

        let _guard = self.sub_lock.lock();
        let mut inner = self.inner.write();
        if let Some(count) = inner.subscriptions.get_mut(&request.uri) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.subscriptions.remove(&request.uri);
            }
        }
        // unsubscribe on an unknown/unsubscribed URI is a silent success
        Ok(Some(serde_json::json!({})))
    }
}

impl CapabilityManager for ResourcesManager {
    fn name(&self) -> &str {
        "resources"
    }

    fn claims(&self, method: &str) -> bool {
        matches!(
            method,
            "resources/list"
                | "resources/read"
                | "resources/templates/list"
                | "resources/subscribe"
                | "resources/unsubscribe"
        )
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
                "resources/list" => self.list(params),
                "resources/read" => self.read(params).await,
                "resources/templates/list" => self.list_templates(),
                "resources/subscribe" => self.subscribe(params),
                "resources/unsubscribe" => self.unsubscribe(params),
                _ => unreachable!("claims() guards dispatch"),
            }
        }
        .boxed()
    }
}
