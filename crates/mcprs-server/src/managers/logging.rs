//! The `logging` capability manager: `logging/setLevel`, plus the in-process
//! `log`/`emit_progress` API used by other subsystems to push
//! `notifications/message` and `notifications/progress` over the bus.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use mcprs_core::{event_types, CapabilityManager, EventBus, ExecuteResult, RequestContext};
use mcprs_protocol::jsonrpc::{error_codes, JsonRpcError};
use mcprs_protocol::types::logging::{LogLevel, SetLevelRequest};
use parking_lot::Mutex;
use serde_json::Value;

pub struct LoggingManager {
    bus: Arc<EventBus>,
    level: Mutex<LogLevel>,
}

impl LoggingManager {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            level: Mutex::new(LogLevel::DEFAULT),
        }
    }

    pub fn current_level(&self) -> LogLevel {
        *self.level.lock()
    }

    fn set_level(&self, params: Option<Value>) -> ExecuteResult {
        let params = params.unwrap_or(Value::Null);
        let request: SetLevelRequest = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, e.to_string()))?;

        let Some(raw) = request.level.filter(|s| !s.is_empty()) else {
            return Err(JsonRpcError::new(
                error_codes::INVALID_PARAMS,
                "level must be a non-empty string",
            ));
        };

        let Some(level) = LogLevel::parse(&raw) else {
            return Err(JsonRpcError::new(
                error_codes::INTERNAL_ERROR,
                format!("Invalid log level: {raw}"),
            ));
        };

        *self.level.lock() = level;
        Ok(Some(serde_json::json!({})))
    }

    /// Publish `notifications/message` iff `level` is at or above the
    /// currently configured severity (lower numeric value = more severe).
    /// Payload shape is `{level, message, logger?, data?}` (spec §4.7).
    pub fn log(&self, level: LogLevel, message: impl Into<String>, logger: Option<String>, data: Option<Value>) {
        if level > self.current_level() {
            return;
        }
        let mut payload = serde_json::json!({
            "level": level.as_str(),
            "message": message.into(),
        });
        if let Some(logger) = logger {
            payload["logger"] = Value::String(logger);
        }
        if let Some(data) = data {
            payload["data"] = data;
        }
        self.bus.publish(event_types::MESSAGE, payload);
    }

    /// Publish `notifications/progress`; unconditional on current level,
    /// but suppressed for an empty token.
    pub fn emit_progress(&self, token: &str, progress: f64, total: Option<f64>) {
        if token.is_empty() {
            return;
        }
        let mut payload = serde_json::json!({
            "progressToken": token,
            "progress": progress,
        });
        if let Some(total) = total {
            payload["total"] = serde_json::json!(total);
        }
        self.bus.publish(event_types::PROGRESS, payload);
    }
}

impl CapabilityManager for LoggingManager {
    fn name(&self) -> &str {
        "logging"
    }

    fn claims(&self, method: &str) -> bool {
        method == "logging/setLevel"
    }

    fn execute(
        &self,
        _method: &str,
        params: Option<Value>,
        _ctx: &RequestContext,
    ) -> BoxFuture<'_, ExecuteResult> {
        let result = self.set_level(params);
        async move { result }.boxed()
    }
}
