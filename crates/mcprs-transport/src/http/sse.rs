//! SSE connection table: bookkeeping for every open `GET` stream, plus the
//! keepalive loop and server-initiated-notification fan-out (spec §4.11.3).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// One line of an SSE frame, pre-formatted with the trailing `\r\n\r\n`.
pub type SseFrame = String;

struct Connection {
    session_id: Mutex<Option<String>>,
    sender: mpsc::UnboundedSender<SseFrame>,
    #[allow(dead_code)]
    established_at: Instant,
    last_sent: Mutex<Instant>,
}

/// Bounded table of live SSE connections, keyed by an opaque monotonic
/// handle. Capacity-limited per spec (default 1000); over-capacity
/// registration is rejected rather than evicting an existing connection.
pub struct SseConnections {
    connections: DashMap<u64, Connection>,
    next_handle: AtomicU64,
    capacity: usize,
}

impl SseConnections {
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_handle: AtomicU64::new(1),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Register a new connection bound to `session_id` (may be empty — the
    /// binding is filled in once the client identifies itself). Returns the
    /// receiver half to drive the response body stream, or `None` if the
    /// table is at capacity.
    pub fn register(&self, session_id: Option<String>) -> Option<(u64, mpsc::UnboundedReceiver<SseFrame>)> {
        if self.connections.len() >= self.capacity {
            warn!("SSE connection table at capacity ({}), rejecting", self.capacity);
            return None;
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(
            handle,
            Connection {
                session_id: Mutex::new(session_id),
                sender: tx,
                established_at: Instant::now(),
                last_sent: Mutex::new(Instant::now()),
            },
        );
        Some((handle, rx))
    }

    pub fn remove(&self, handle: u64) {
        self.connections.remove(&handle);
    }

    pub fn remove_for_session(&self, session_id: &str) {
        self.connections
            .retain(|_, conn| conn.session_id.lock().as_deref() != Some(session_id));
    }

    /// Write a data frame to every connection (optionally restricted to one
    /// session). A send failure (receiver dropped) removes the connection.
    pub fn broadcast(&self, session_id: Option<&str>, payload: &str) {
        let frame = format!("data: {payload}\r\n\r\n");
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            let matches = match session_id {
                Some(sid) => entry.session_id.lock().as_deref() == Some(sid),
                None => true,
            };
            if !matches {
                continue;
            }
            if entry.sender.send(frame.clone()).is_ok() {
                *entry.last_sent.lock() = Instant::now();
            } else {
                dead.push(*entry.key());
            }
        }
        for handle in dead {
            self.connections.remove(&handle);
        }
    }

    /// Send `: keepalive\r\n\r\n` to every connection whose `last_sent` is at
    /// least `interval` old. Called from the background keepalive task.
    pub fn tick_keepalive(&self, interval: Duration) {
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            let due = entry.last_sent.lock().elapsed() >= interval;
            if !due {
                continue;
            }
            if entry.sender.send(": keepalive\r\n\r\n".to_string()).is_ok() {
                *entry.last_sent.lock() = Instant::now();
            } else {
                dead.push(*entry.key());
            }
        }
        for handle in dead {
            self.connections.remove(&handle);
        }
    }

    pub fn bind_session(&self, handle: u64, session_id: String) {
        if let Some(conn) = self.connections.get(&handle) {
            *conn.session_id.lock() = Some(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn register_respects_capacity() {
        let table = SseConnections::new(1);
        assert!(table.register(None).is_some());
        assert!(table.register(None).is_none());
    }

    #[test]
    fn broadcast_to_session_only_reaches_bound_connection() {
        let table = SseConnections::new(10);
        let (h1, mut rx1) = table.register(Some("s1".into())).unwrap();
        let (_h2, mut rx2) = table.register(Some("s2".into())).unwrap();

        table.broadcast(Some("s1"), r#"{"uri":"file://x"}"#);

        let frame = rx1.try_recv().unwrap();
        assert!(frame.starts_with("data: "));
        assert!(rx2.try_recv().is_err());
        let _ = h1;
    }

    #[test]
    fn dropped_receiver_is_pruned_on_next_broadcast() {
        let table = SseConnections::new(10);
        let (_handle, rx) = table.register(None).unwrap();
        drop(rx);
        table.broadcast(None, "{}");
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn keepalive_fires_once_interval_elapsed() {
        let table = SseConnections::new(10);
        let (_handle, mut rx) = table.register(None).unwrap();
        table.tick_keepalive(Duration::from_millis(0));
        assert_eq!(rx.try_recv().unwrap(), ": keepalive\r\n\r\n");
    }
}
