//! Transport-level failures: I/O, session lifecycle, SSE bookkeeping.

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("listener bind failed on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session not found or expired")]
    SessionNotFound,

    #[error("Mcp-Session-Id header required")]
    MissingSessionHeader,

    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(String),

    #[error("server is shutting down")]
    ShuttingDown,
}
