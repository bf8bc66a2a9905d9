//! The execution context threaded through every call path: cancellation,
//! the device record, and the handle execs see.
//!
//! Kept as explicit structs passed by value/reference rather than
//! thread-local or task-local state, per the design note that a language
//! without per-goroutine contexts should thread this through explicitly.

use crate::inventory::DeviceRecord;
use crate::telemetry::Logger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

/// A cooperative cancellation signal. Cloning shares the same underlying
/// flag; cancelling any clone cancels all of them.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancellationToken::cancel`] has been called. Useful
    /// to race against an in-flight exec invocation.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The narrow view of the world a single exec invocation is handed:
/// the device record it is operating on and a logger.
///
/// Deliberately does *not* carry an inventory handle: execs must not call
/// the inventory collaborator directly (only the driver does, at the top
/// and bottom of a run), so `ExecContext` withholds it even though the
/// wider execution context the action runner holds has one.
#[derive(Clone)]
pub struct ExecContext {
    pub device: Arc<RwLock<DeviceRecord>>,
    pub logger: Logger,
    pub cancellation: CancellationToken,
}

impl ExecContext {
    pub fn new(device: Arc<RwLock<DeviceRecord>>, logger: Logger, cancellation: CancellationToken) -> Self {
        Self {
            device,
            logger,
            cancellation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancellation_token_wakes_waiters() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });

        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_token_already_cancelled_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(50), token.cancelled())
            .await
            .expect("cancelled() must not block once already cancelled");
    }
}
