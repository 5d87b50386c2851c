//! Cooperative cancellation for the spool pipeline.
//!
//! A job cancel arrives from outside (Ctrl-C, SIGTERM from the print
//! scheduler, a caller dropping interest). Instead of unwinding from a signal
//! handler, every blocking point in the pipeline races its own future against
//! [`CancelToken::cancelled`] and returns [`SpoolError::Cancelled`] when the
//! token fires. Resources held at that point (child processes, the
//! compression worker) are released by their `Drop` impls.

use crate::error::SpoolError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared, cloneable cancellation flag.
///
/// Cloning is cheap; all clones observe the same state. Once cancelled a
/// token never resets.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a token in the "not cancelled" state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `fut` to completion unless the token fires first.
    ///
    /// Cancellation wins ties so a cancelled job never starts another
    /// blocking step.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, SpoolError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(SpoolError::Cancelled),
            out = fut => Ok(out),
        }
    }
}
