//! Per-request execution context: a cancellation token paired with a deadline.
//!
//! The HTTP entry point creates a root context for every inbound request; the
//! reverse proxy derives a tighter child per backend call. Cancelling a parent
//! cancels every child, while a child expiring or being cancelled leaves the
//! parent untouched.
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::{CancellationToken, DropGuard};

#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Instant,
}

impl RequestContext {
    /// A root context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Instant::now() + timeout,
        }
    }

    /// Derive a child bounded by `min(parent deadline, now + timeout)`.
    pub fn child(&self, timeout: Duration) -> Self {
        let deadline = self.deadline.min(Instant::now() + timeout);
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// True once the context was cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = sleep_until(self.deadline) => {}
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A guard that cancels this context when dropped.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_deadline_never_exceeds_parent() {
        let parent = RequestContext::with_timeout(Duration::from_secs(1));
        let child = parent.child(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.child(Duration::from_millis(100));
        assert!(tighter.deadline() < parent.deadline());
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_child_only_downwards() {
        let parent = RequestContext::with_timeout(Duration::from_secs(30));
        let child = parent.child(Duration::from_secs(5));

        child.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());

        let second = parent.child(Duration::from_secs(5));
        parent.cancel();
        assert!(second.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn done_resolves_at_deadline() {
        let context = RequestContext::with_timeout(Duration::from_millis(50));
        assert!(!context.is_expired());
        context.done().await;
        assert!(context.is_expired());
        assert_eq!(context.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn drop_guard_cancels() {
        let context = RequestContext::with_timeout(Duration::from_secs(30));
        let guard = context.drop_guard();
        assert!(!context.is_cancelled());
        drop(guard);
        assert!(context.is_cancelled());
    }
}
