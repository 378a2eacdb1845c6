//! Shared barge-in interrupt token.
//!
//! One token is shared by the supervisor, player, splitter owner, and
//! reasoning loop. Raising it must be observable by all of them within
//! 100 ms; raising is idempotent. Unlike a `CancellationToken` it is
//! reusable: the supervisor clears it once every stage has drained, and
//! the pipeline is immediately ready for the next turn.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A raisable, clearable interruption flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    raised: AtomicBool,
    notify: Notify,
}

impl Interrupt {
    /// Create a token in the cleared state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag, waking every waiter. Idempotent.
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Clear the flag, waking tasks parked in [`cleared`](Self::cleared).
    pub fn clear(&self) {
        self.inner.raised.store(false, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether the flag is currently raised.
    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Resolve when the flag is raised (immediately if it already is).
    pub async fn raised(&self) {
        loop {
            if self.is_raised() {
                return;
            }
            let mut notified = std::pin::pin!(self.inner.notify.notified());
            // Register before the re-check so a concurrent raise cannot
            // slip between the check and the await.
            notified.as_mut().enable();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }

    /// Resolve when the flag is cleared (immediately if it already is).
    pub async fn cleared(&self) {
        loop {
            if !self.is_raised() {
                return;
            }
            let mut notified = std::pin::pin!(self.inner.notify.notified());
            notified.as_mut().enable();
            if !self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}
