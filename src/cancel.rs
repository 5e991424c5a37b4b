//! Cancellation signal for a blocking collaborator call.
//!
//! A blocked socket read or a hung child process does not notice that the
//! async side stopped waiting for it. [`CancelToken`] bridges the two: the
//! blocking side registers [`Interrupt`] hooks (shut the socket down, kill
//! the child) and the async side fires them when the attempt times out, so
//! the blocked call actually returns and its thread is reclaimed.
//!
//! Cancelling twice, or cancelling after the call already finished, is a
//! no-op. A hook registered after cancellation fires immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Forces a blocked collaborator call to return.
///
/// Called from a different thread than the one that is blocked.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

impl<F> Interrupt for F
where
    F: Fn() + Send + Sync,
{
    fn interrupt(&self) {
        self()
    }
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<Box<dyn Interrupt>>>,
}

/// Shared, cloneable cancellation flag with interrupt hooks.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fire every registered hook once. Later calls do nothing.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = std::mem::take(
            &mut *self
                .inner
                .hooks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for hook in hooks {
            hook.interrupt();
        }
    }

    /// Register a hook to run on cancellation.
    pub fn on_cancel(&self, hook: Box<dyn Interrupt>) {
        let mut hooks = self
            .inner
            .hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Checked under the lock: `cancel` sets the flag before draining.
        if self.is_cancelled() {
            drop(hooks);
            hook.interrupt();
            return;
        }
        hooks.push(hook);
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
