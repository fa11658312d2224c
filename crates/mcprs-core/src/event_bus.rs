//! Process-wide (but not process-global — constructed once and shared by
//! reference) pub/sub event bus decoupling capability managers from
//! transports.
//!
//! Mirrors the teacher's hybrid-mutex discipline: a single `parking_lot`
//! mutex guards short-lived bookkeeping, and callback invocation always
//! happens with the lock released so a slow or panicking subscriber can
//! never block or poison the bus for others.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::error;

/// Standard MCP notification event-type strings, used bit-exact as the
/// event-bus key and as the JSON-RPC `method` of the resulting
/// notification.
pub mod event_types {
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
    pub const MESSAGE: &str = "notifications/message";
    pub const PROGRESS: &str = "notifications/progress";
    pub const CANCELLED: &str = "notifications/cancelled";
    pub const SHUTDOWN: &str = "notifications/shutdown";

    /// Event types that map 1:1 onto a spontaneous JSON-RPC notification a
    /// transport forwards verbatim to its client(s). `SHUTDOWN` is excluded —
    /// each transport drives its own graceful-shutdown sequence and emits
    /// that notification itself rather than through generic forwarding.
    pub const NOTIFICATION_EVENT_TYPES: &[&str] = &[
        TOOLS_LIST_CHANGED,
        RESOURCES_LIST_CHANGED,
        RESOURCES_UPDATED,
        PROMPTS_LIST_CHANGED,
        MESSAGE,
        PROGRESS,
        CANCELLED,
    ];
}

/// Wrap an event-bus payload as a JSON-RPC notification envelope
/// (`{"jsonrpc":"2.0","method":...,"params":...}`), the shape every
/// transport writes verbatim for a server-initiated push.
pub fn notification_envelope(method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}

/// A subscriber callback. Rust closures have no stable identity to key an
/// unsubscribe-by-value lookup the way the source's dynamic-language
/// callback comparison does, so `subscribe` returns an opaque
/// [`SubscriptionId`] token used for removal instead — the idiomatic Rust
/// analogue of "unsubscribe this exact callback".
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    callback: EventCallback,
}

#[derive(Default)]
struct Inner {
    subscriptions: HashMap<String, Vec<Subscription>>,
    pending: HashMap<String, VecDeque<Value>>,
}

/// The shared pub/sub bus. Construct once per server instance (tests build
/// a fresh one per case) and pass by `Arc` to every manager and transport.
pub struct EventBus {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to an event type. Pending events of that type (published
    /// before any subscriber existed) are drained and delivered in publish
    /// order immediately, before this call returns.
    pub fn subscribe(&self, event_type: &str, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let drained: Vec<Value> = {
            let mut inner = self.inner.lock();
            inner
                .subscriptions
                .entry(event_type.to_string())
                .or_default()
                .push(Subscription {
                    id,
                    callback: callback.clone(),
                });
            inner
                .pending
                .get_mut(event_type)
                .map(std::mem::take)
                .map(Vec::from)
                .unwrap_or_default()
        };

        for payload in drained {
            Self::invoke(&callback, &payload);
        }

        id
    }

    pub fn unsubscribe(&self, event_type: &str, id: SubscriptionId) {
        let mut inner = self.inner.lock();
        if let Some(subs) = inner.subscriptions.get_mut(event_type) {
            subs.retain(|s| s.id != id);
        }
    }

    pub fn unsubscribe_all(&self, event_type: &str) {
        self.inner.lock().subscriptions.remove(event_type);
    }

    /// Publish an event. If subscribers exist, each is invoked (outside the
    /// lock) in registration order; otherwise the event is queued for the
    /// next matching subscriber.
    pub fn publish(&self, event_type: &str, payload: Value) {
        let callbacks: Vec<EventCallback> = {
            let mut inner = self.inner.lock();
            match inner.subscriptions.get(event_type) {
                Some(subs) if !subs.is_empty() => {
                    subs.iter().map(|s| s.callback.clone()).collect()
                }
                _ => {
                    inner
                        .pending
                        .entry(event_type.to_string())
                        .or_default()
                        .push_back(payload);
                    return;
                }
            }
        };

        for callback in callbacks {
            Self::invoke(&callback, &payload);
        }
    }

    fn invoke(callback: &EventCallback, payload: &Value) {
        let result = catch_unwind(AssertUnwindSafe(|| callback(payload)));
        if result.is_err() {
            error!("event bus subscriber panicked while handling an event");
        }
    }

    pub fn has_subscribers(&self, event_type: &str) -> bool {
        self.inner
            .lock()
            .subscriptions
            .get(event_type)
            .is_some_and(|s| !s.is_empty())
    }

    pub fn pending_count(&self, event_type: &str) -> usize {
        self.inner
            .lock()
            .pending
            .get(event_type)
            .map_or(0, VecDeque::len)
    }

    pub fn clear_pending(&self, event_type: &str) {
        self.inner.lock().pending.remove(event_type);
    }

    pub fn clear_all_pending(&self) {
        self.inner.lock().pending.clear();
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.inner
            .lock()
            .subscriptions
            .get(event_type)
            .map_or(0, Vec::len)
    }
}
