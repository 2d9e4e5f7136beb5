//! Controlled Futures
//!
//! A controlled future is an awaitable value that is settled from the
//! outside: a key handler registered before the key arrives holds the
//! [`Resolver`], and the page awaiting input holds the [`Pending`] half.
//!
//! Settlement is single-shot. The first `resolve` or `reject` wins and every
//! later call is a no-op that returns `false`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::CliError;

type Settlement<T> = Result<T, CliError>;

struct Slot<T> {
    sender: Mutex<Option<oneshot::Sender<Settlement<T>>>>,
}

impl<T> Slot<T> {
    fn settle(&self, value: Settlement<T>) -> bool {
        match self.sender.lock().take() {
            Some(tx) => {
                // A dropped receiver still counts as settled; nobody can
                // observe a second value either way.
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    fn settled(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Type-erased handle used by the CLI to cancel outstanding futures
pub(crate) trait Cancel: Send + Sync {
    /// Reject with [`CliError::Cancelled`]; false when already settled
    fn cancel(&self) -> bool;

    fn is_settled(&self) -> bool;
}

impl<T: Send> Cancel for Slot<T> {
    fn cancel(&self) -> bool {
        self.settle(Err(CliError::Cancelled))
    }

    fn is_settled(&self) -> bool {
        self.settled()
    }
}

/// Settling half of a controlled future
pub struct Resolver<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> Resolver<T> {
    /// Fulfil the future; returns false when it was already settled
    pub fn resolve(&self, value: T) -> bool {
        self.slot.settle(Ok(value))
    }

    /// Fail the future; returns false when it was already settled
    pub fn reject(&self, error: CliError) -> bool {
        self.slot.settle(Err(error))
    }

    /// Whether the future has been settled
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.settled()
    }
}

impl<T: Send + 'static> Resolver<T> {
    pub(crate) fn cancel_handle(&self) -> std::sync::Weak<dyn Cancel> {
        let slot: Arc<dyn Cancel> = self.slot.clone();
        Arc::downgrade(&slot)
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Awaiting half of a controlled future
///
/// Resolves to `Err(CliError::Cancelled)` if every resolver is dropped
/// without settling.
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<Settlement<T>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T, CliError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(settlement)) => Poll::Ready(settlement),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CliError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create an unregistered controlled future
///
/// Prefer `InteractiveCli::create_controlled`, which also registers the
/// future for cancellation on cleanup.
#[must_use]
pub fn controlled<T>() -> (Resolver<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    let slot = Arc::new(Slot {
        sender: Mutex::new(Some(tx)),
    });
    (Resolver { slot }, Pending { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_once() {
        let (resolver, pending) = controlled::<u32>();
        assert!(resolver.resolve(7));
        assert!(!resolver.resolve(8));
        assert!(!resolver.reject(CliError::Rejected("late".into())));
        assert_eq!(pending.await, Ok(7));
    }

    #[tokio::test]
    async fn test_reject() {
        let (resolver, pending) = controlled::<u32>();
        assert!(resolver.reject(CliError::Rejected("nope".into())));
        assert_eq!(pending.await, Err(CliError::Rejected("nope".into())));
    }

    #[tokio::test]
    async fn test_resolve_from_another_task() {
        let (resolver, pending) = controlled::<&'static str>();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            resolver.resolve("from task");
        });
        assert_eq!(pending.await, Ok("from task"));
    }

    #[tokio::test]
    async fn test_dropped_resolver_cancels() {
        let (resolver, pending) = controlled::<u32>();
        drop(resolver);
        assert_eq!(pending.await, Err(CliError::Cancelled));
    }

    #[test]
    fn test_cancel_handle() {
        let (resolver, _pending) = controlled::<u32>();
        let handle = resolver.cancel_handle();
        let cancel = handle.upgrade().unwrap();
        assert!(cancel.cancel());
        assert!(cancel.is_settled());
        assert!(resolver.is_settled());
        assert!(!resolver.resolve(1));
    }
}
