//! The `completion` capability manager: `completion/complete`.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use mcprs_core::{CapabilityManager, ExecuteResult, RequestContext};
use mcprs_protocol::jsonrpc::{error_codes, JsonRpcError};
use mcprs_protocol::types::completion::{
    CompleteRequest, CompleteResult, CompletionValues, MAX_COMPLETION_VALUES,
};
use parking_lot::RwLock;
use serde_json::Value;

/// A pluggable completion provider. Given the reference type/name-or-uri
/// and the partial argument value, returns the full (unbounded) candidate
/// list; the manager truncates to [`MAX_COMPLETION_VALUES`] and sets
/// `hasMore`.
pub type CompletionProvider = Arc<
    dyn Fn(&str, &str, &str) -> BoxFuture<'static, Vec<String>> + Send + Sync,
>;

pub struct CompletionManager {
    provider: RwLock<Option<CompletionProvider>>,
}

impl Default for CompletionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionManager {
    pub fn new() -> Self {
        Self {
            provider: RwLock::new(None),
        }
    }

    pub fn set_provider(&self, provider: CompletionProvider) {
        *self.provider.write() = Some(provider);
    }

    async fn complete(&self, params: Option<Value>) -> ExecuteResult {
        let params = params.unwrap_or(Value::Null);
        let request: CompleteRequest = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?;

        let ref_key = match request.reference.ref_type.as_str() {
            "ref/prompt" => request.reference.name.clone().unwrap_or_default(),
            "ref/resource" => request.reference.uri.clone().unwrap_or_default(),
            other => {
                return Err(JsonRpcError::new(
                    error_codes::INVALID_PARAMS,
                    format!("unsupported completion ref type: {other}"),
                ))
            }
        };

        let provider = self.provider.read().clone();
        let mut values = match provider {
            Some(provider) => {
                provider(
                    &request.reference.ref_type,
                    &ref_key,
                    &request.argument.value,
                )
                .await
            }
            None => Vec::new(),
        };

        let total = values.len();
        let has_more = total > MAX_COMPLETION_VALUES;
        values.truncate(MAX_COMPLETION_VALUES);

        let result = CompleteResult {
            completion: CompletionValues {
                values,
                total: Some(total),
                has_more: Some(has_more),
            },
        };
        Ok(Some(serde_json::to_value(result).unwrap()))
    }
}

impl CapabilityManager for CompletionManager {
    fn name(&self) -> &str {
        "completion"
    }

    fn claims(&self, method: &str) -> bool {
        method == "completion/complete"
    }

    fn execute(
        &self,
        _method: &str,
        params: Option<Value>,
        _ctx: &RequestContext,
    ) -> BoxFuture<'_, ExecuteResult> {
        async move { self.complete(params).await }.boxed()
    }
}
