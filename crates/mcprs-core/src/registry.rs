//! The capability-manager trait and the ordered, first-match registry that
//! routes JSON-RPC method names to the manager that claims them.

use mcprs_protocol::jsonrpc::{JsonRpcError, RequestId};
use serde_json::Value;

/// Per-request context threaded into every manager invocation: the calling
/// session (if any — stdio has exactly one implicit session) and a handle
/// onto the cancelled-request set so long-running handlers can cooperate
/// with `notifications/cancelled` (spec §9 Open Questions).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: Option<String>,
    pub request_id: Option<RequestId>,
}

impl RequestContext {
    pub fn new(session_id: Option<String>, request_id: Option<RequestId>) -> Self {
        Self {
            session_id,
            request_id,
        }
    }
}

/// Outcome of executing a claimed method: `Ok(Some(value))` for a normal
/// reply, `Ok(None)` for a notification (no reply emitted), `Err` for a
/// domain error to be wrapped as a JSON-RPC error response.
pub type ExecuteResult = Result<Option<Value>, JsonRpcError>;

/// A module owning one MCP namespace (`tools/*`, `resources/*`, ...).
pub trait CapabilityManager: Send + Sync {
    /// Human-readable name, used only for diagnostics.
    fn name(&self) -> &str;

    /// Whether this manager handles the given JSON-RPC method.
    fn claims(&self, method: &str) -> bool;

    /// Execute a claimed method. Implementations must not block the async
    /// runtime; any internal locking is short-lived per spec §5.
    fn execute(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &RequestContext,
    ) -> futures::future::BoxFuture<'_, ExecuteResult>;
}

/// Ordered collection of capability managers. Lookup returns the first
/// manager (in registration order) whose `claims` is true; collisions are
/// resolved silently in favor of the first registrant.
#[derive(Default)]
pub struct CapabilityRegistry {
    managers: Vec<std::sync::Arc<dyn CapabilityManager>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manager. Re-registering the identical `Arc` (same
    /// allocation) is a no-op.
    pub fn register(&mut self, manager: std::sync::Arc<dyn CapabilityManager>) {
        let already_present = self
            .managers
            .iter()
            .any(|m| std::sync::Arc::ptr_eq(m, &manager));
        if !already_present {
            self.managers.push(manager);
        }
    }

    pub fn lookup(&self, method: &str) -> Option<std::sync::Arc<dyn CapabilityManager>> {
        self.managers.iter().find(|m| m.claims(method)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    struct Echo(&'static str, &'static [&'static str]);

    impl CapabilityManager for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn claims(&self, method: &str) -> bool {
            self.1.contains(&method)
        }

        fn execute(
            &self,
            _method: &str,
            _params: Option<Value>,
            _ctx: &RequestContext,
        ) -> futures::future::BoxFuture<'_, ExecuteResult> {
            async { Ok(Some(serde_json::json!({"from": self.0}))) }.boxed()
        }
    }

    #[tokio::test]
    async fn first_registered_wins_on_collision() {
        let mut registry = CapabilityRegistry::new();
        registry.register(std::sync::Arc::new(Echo("a", &["ping"])));
        registry.register(std::sync::Arc::new(Echo("b", &["ping"])));

        let manager = registry.lookup("ping").unwrap();
        assert_eq!(manager.name(), "a");
    }

    #[tokio::test]
    async fn unclaimed_method_is_none() {
        let registry = CapabilityRegistry::new();
        assert!(registry.lookup("nope").is_none());
    }
}
