//! Lifetime extension.
//!
//! Handlers hand work that must outlive their own return (such as persisting a
//! response after it was delivered) to [`PendingWork`]. The host keeps the
//! worker alive until [`PendingWork::settle`] returns.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{trace, warn};

/// Registered work that runs to completion regardless of its caller.
///
/// Tasks are detached: neither dropping a handle nor abandoning
/// [`settle`](Self::settle) cancels them, and finished tasks are released
/// as soon as they complete.
#[derive(Debug, Clone, Default)]
pub struct PendingWork {
    tracker: TaskTracker,
}

impl PendingWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `work`. It starts immediately on the current runtime.
    pub fn wait_until<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        trace!(label, "Registering pending work");
        self.tracker.spawn(async move {
            if AssertUnwindSafe(work).catch_unwind().await.is_err() {
                warn!(label, "Pending work did not complete");
            }
        });
    }

    /// Number of registered tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait until all registered work, including work registered meanwhile, has finished.
    pub async fn settle(&self) {
        // A closed tracker still accepts tasks; closing only arms `wait`.
        self.tracker.close();
        self.tracker.wait().await;
    }
}
