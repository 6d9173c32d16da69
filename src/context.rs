//! Cancellation contexts passed to queue operations.
//!
//! A `Context` is a cheap, cloneable view of a cancellation flag. The flag is
//! owned by the matching [`CancelHandle`]; once cancelled it stays cancelled.
//! Dropping every handle without cancelling leaves the context live forever,
//! the same as [`Context::background`].

use std::future;
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Option<watch::Receiver<bool>>,
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl Context {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self { cancelled: None }
    }

    /// A new context together with the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                cancelled: Some(rx),
            },
            CancelHandle { flag: Arc::new(tx) },
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the context is cancelled. Never resolves for a
    /// background context.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.cancelled else {
            return future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return future::pending().await;
            }
        }
    }
}

impl CancelHandle {
    /// Cancels the context. Later calls have no effect.
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::Context;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_cancel_wakes_every_clone() {
        let (ctx, handle) = Context::with_cancel();
        let clone = ctx.clone();
        assert!(!ctx.is_cancelled());

        let waiter = tokio::spawn(async move { clone.cancelled().await });
        handle.cancel();
        handle.cancel();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke up")
            .unwrap();
        assert!(ctx.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_before_wait_resolves_immediately() {
        let (ctx, handle) = Context::with_cancel();
        handle.cancel();
        timeout(Duration::from_millis(100), ctx.cancelled())
            .await
            .expect("already cancelled");
    }

    #[tokio::test]
    async fn test_background_never_cancels() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        assert!(
            timeout(Duration::from_millis(50), ctx.cancelled())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = Context::with_cancel();
        drop(handle);
        assert!(!ctx.is_cancelled());
        assert!(
            timeout(Duration::from_millis(50), ctx.cancelled())
                .await
                .is_err()
        );
    }
}
