//! Bounded execution context: a deadline plus a cancellation signal.
//!
//! No dependency on `tokio-util`'s `CancellationToken` here, so the same
//! shape is hand-rolled with `tokio::sync::Notify` plus an `AtomicBool`:
//! a shared flag for the already-cancelled check, a `Notify` to wake
//! anyone parked on `cancelled()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A cooperative cancellation signal. Cloning shares the same underlying
/// flag — cancelling any clone cancels all of them.
#[derive(Clone, Debug)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signals cancellation to every clone and every waiter.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called on this token (or any clone).
    /// Resolves immediately if already cancelled.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // `enable()` registers this future as a waiter *before* the flag
        // check below runs, so a `cancel()` landing between `enable()` and
        // the check is still observed by the subsequent `notified.await`
        // instead of being missed — `notify_waiters()` only wakes waiters
        // already registered at the time it's called, and without this the
        // registration race would otherwise leave us parked forever.
        notified.as_mut().enable();

        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// An execution handle carrying a deadline and a cancellation signal,
/// passed to every health check invocation and every middleware layer.
#[derive(Clone, Debug)]
pub struct BoundedContext {
    deadline: Instant,
    cancel: CancelToken,
}

impl BoundedContext {
    /// A context with the given timeout from now and a fresh cancel token.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: CancelToken::new(),
        }
    }

    /// A context with the given timeout sharing an existing cancel token —
    /// used to derive a per-tick context from a runner's long-lived cancel
    /// signal, so stopping the runner aborts an in-flight tick promptly.
    pub fn with_cancel_and_timeout(cancel: CancelToken, timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    /// A child context sharing the parent's cancellation (cancelling the
    /// parent cancels the child) but with its own, possibly tighter,
    /// deadline — this is how a monitor derives the per-tick context from
    /// its long-lived runner context with the configured check timeout.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let child_cancel = self.cancel.clone();
        Self {
            deadline: Instant::now() + timeout,
            cancel: child_cancel,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline || self.cancel.is_cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Resolves when the context is cancelled OR its deadline elapses,
    /// whichever comes first — the condition every wrapper and the health
    /// check itself is expected to race against.
    pub async fn done(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn cancel_wakes_pending_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(StdDuration::from_millis(200), handle)
            .await
            .expect("cancellation should wake the waiter")
            .unwrap();
    }

    #[tokio::test]
    async fn child_context_inherits_parent_cancellation() {
        let parent = BoundedContext::with_timeout(StdDuration::from_secs(10));
        let child = parent.child_with_timeout(StdDuration::from_millis(5));
        assert!(!child.is_cancelled());
        parent.cancel_handle().cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn expires_on_its_own_deadline_even_if_parent_alive() {
        let ctx = BoundedContext::with_timeout(StdDuration::from_millis(5));
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert!(ctx.is_expired());
    }
}
