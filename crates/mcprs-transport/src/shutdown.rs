//! Graceful-shutdown state shared by a transport's request-handling paths:
//! a shutting-down flag plus a pending-request counter polled to drain
//! in-flight work before exit (spec §4.10/§4.11.4).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Default drain budget for a transport with no `ServerConfig` of its own
/// (stdio) — matches `ServerConfig::default()`'s HTTP values (spec §4.10).
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_DRAIN_POLL: Duration = Duration::from_millis(50);

#[derive(Default)]
pub struct ShutdownState {
    shutting_down: AtomicBool,
    pending: AtomicUsize,
}

/// RAII guard incrementing the pending-request count for the lifetime of one
/// in-flight request.
pub struct PendingGuard<'a>(&'a ShutdownState);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ShutdownState {
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn track_request(&self) -> PendingGuard<'_> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        PendingGuard(self)
    }

    /// Poll the pending-request count until it drains to zero or `timeout`
    /// elapses. Returns `true` on a clean drain.
    pub async fn wait_for_drain(&self, timeout: Duration, poll_interval: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.pending_count() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Wait for `Ctrl-C` or (on Unix) `SIGTERM` — the shutdown trigger shared by
/// both transports.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn drains_immediately_with_no_pending_requests() {
        let state = ShutdownState::default();
        assert!(state.wait_for_drain(Duration::from_millis(100), Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn waits_for_guard_to_drop() {
        let state = std::sync::Arc::new(ShutdownState::default());
        let guard = state.track_request();
        assert_eq!(state.pending_count(), 1);

        let state_clone = state.clone();
        let wait = tokio::spawn(async move {
            state_clone
                .wait_for_drain(Duration::from_millis(500), Duration::from_millis(5))
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert!(wait.await.unwrap());
    }

    #[tokio::test]
    async fn times_out_with_stuck_pending_request() {
        let state = ShutdownState::default();
        let _guard = state.track_request();
        let drained = state
            .wait_for_drain(Duration::from_millis(30), Duration::from_millis(5))
            .await;
        assert!(!drained);
    }
}
