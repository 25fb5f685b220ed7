//! Cooperative cancellation for in-flight builds
//!
//! A `CancelToken` is threaded through lock acquisition and sandbox
//! execution so callers can bound waits without the engine assuming a
//! default timeout. Cloning shares the same cancellation state.

use tokio::sync::watch;

/// Cloneable cancellation token backed by a watch channel
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a new, uncancelled token
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Request cancellation; all clones observe it
    pub fn cancel(&self) {
        // Receiver side is always alive because self holds one.
        let _ = self.tx.send(true);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        // The sender lives in self, so changed() only errs if self is gone.
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
