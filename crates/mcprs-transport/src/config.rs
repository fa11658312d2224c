//! Transport tuning knobs, with defaults matching the protocol's literal
//! constants rather than anything environment-specific.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub endpoint_path: String,
    pub session_timeout: Duration,
    pub max_sessions: usize,
    pub max_sse_connections: usize,
    pub keepalive_interval: Duration,
    pub graceful_shutdown_timeout: Duration,
    pub graceful_shutdown_poll: Duration,
    pub cors: Option<CorsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            endpoint_path: "/mcp".to_string(),
            session_timeout: Duration::from_secs(1800),
            max_sessions: 10_000,
            max_sse_connections: 1000,
            keepalive_interval: Duration::from_millis(30_000),
            graceful_shutdown_timeout: Duration::from_millis(5_000),
            graceful_shutdown_poll: Duration::from_millis(50),
            cors: None,
        }
    }
}

/// Origin allow-list. `*` matches any origin; otherwise case-insensitive
/// exact match against the list.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn allow_all() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
    }
}
