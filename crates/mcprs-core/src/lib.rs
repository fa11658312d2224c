//! Shared core: the pub/sub event bus and the capability-manager registry.
//!
//! Everything here is transport- and manager-agnostic; `mcprs-server` owns
//! the concrete managers and `mcprs-transport` owns the wire adapters.

pub mod event_bus;
pub mod registry;

pub use event_bus::{event_types, notification_envelope, EventBus, EventCallback, SubscriptionId};
pub use registry::{CapabilityManager, CapabilityRegistry, ExecuteResult, RequestContext};
