//! Session table: one entry per successful `initialize`, expired after
//! `session_timeout` of inactivity (spec §3 Session, §4.11.2 step 4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

pub struct Session {
    pub protocol_version: String,
    pub created_at: Instant,
    last_activity: Mutex<Instant>,
    initialized: AtomicBool,
}

impl Session {
    fn new(protocol_version: String) -> Self {
        let now = Instant::now();
        Self {
            protocol_version,
            created_at: now,
            last_activity: Mutex::new(now),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.lock().elapsed() > timeout
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

/// Process-scoped session table, keyed by the 32-hex-char session id
/// string carried in the `Mcp-Session-Id` header.
#[derive(Default)]
pub struct SessionTable {
    sessions: DashMap<String, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Insert a new session, reaping expired entries first if at capacity
    /// (spec §4.11.2 step 7, MAX_SESSIONS bound).
    pub fn create(&self, id: String, protocol_version: String, max_sessions: usize, timeout: Duration) {
        if self.sessions.len() >= max_sessions {
            let _ = self.reap_expired(timeout);
        }
        self.sessions.insert(id, Session::new(protocol_version));
    }

    pub fn touch(&self, id: &str) -> bool {
        match self.sessions.get(id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    /// Returns `true` iff the session exists and is not expired. Does not
    /// itself reap — callers combine this with [`Self::remove`] as needed.
    pub fn is_valid(&self, id: &str, timeout: Duration) -> bool {
        match self.sessions.get(id) {
            Some(session) => !session.is_expired(timeout),
            None => false,
        }
    }

    pub fn mark_initialized(&self, id: &str) {
        if let Some(session) = self.sessions.get(id) {
            session.mark_initialized();
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Remove every expired session and return the ids removed, so a caller
    /// can drop their SSE connections too (spec §4.11.2 step 4).
    pub fn reap_expired(&self, timeout: Duration) -> Vec<String> {
        let mut reaped = Vec::new();
        self.sessions.retain(|id, session| {
            let expired = session.is_expired(timeout);
            if expired {
                reaped.push(id.clone());
            }
            !expired
        });
        reaped
    }
}
