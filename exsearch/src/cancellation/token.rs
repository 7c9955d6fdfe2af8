//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

/// A token for cooperative cancellation.
///
/// Clones share state: cancelling one cancels all of them. Cancellation is
/// idempotent - only the first cancellation reason is kept.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Wakes every task awaiting [`Self::cancelled`].
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            // reason is set before the flag so observers never see a
            // cancelled token without one
            let mut slot = self.inner.reason.write();
            if self.inner.cancelled.load(Ordering::SeqCst) {
                return;
            }
            *slot = Some(reason.into());
            self.inner.cancelled.store(true, Ordering::SeqCst);
        }
        self.inner.notify.notify_waiters();
        tracing::debug!(reason = ?self.reason(), "Cancellation requested");
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Completes once the token is cancelled.
    ///
    /// Returns immediately if cancellation was already requested.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a concurrent
            // `cancel` cannot slip between the check and the await.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
