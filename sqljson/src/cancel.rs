//!
//! Cooperative cancellation of a build.
//!

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::{SqlJsonError, SqlJsonResult};

/// A clonable handle that aborts the builds it was handed to.
///
/// Builds observe it before every query and while waiting on remote ones.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    wakers: Mutex<Vec<(u64, Waker)>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let wakers = std::mem::take(&mut *self.inner.wakers.lock());
        for (_, waker) in wakers {
            waker.wake();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// A future resolving once the token is cancelled.
    pub fn cancelled(&self) -> Cancelled {
        Cancelled {
            inner: self.inner.clone(),
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub(crate) fn check(&self) -> SqlJsonResult<()> {
        if self.is_cancelled() {
            Err(SqlJsonError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "CancelToken({})", self.is_cancelled())
    }
}

pub struct Cancelled {
    inner: Arc<Inner>,
    id: u64,
}

impl Future for Cancelled {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut wakers = self.inner.wakers.lock();

        // `cancel` raises the flag before taking the lock, so checking under
        // the lock cannot miss a wake-up.
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return Poll::Ready(());
        }

        match wakers.iter_mut().find(|(id, _)| *id == self.id) {
            Some((_, waker)) => {
                if !waker.will_wake(cx.waker()) {
                    *waker = cx.waker().clone();
                }
            }
            None => wakers.push((self.id, cx.waker().clone())),
        }

        Poll::Pending
    }
}

impl Drop for Cancelled {
    fn drop(&mut self) {
        let id = self.id;
        self.inner.wakers.lock().retain(|(waiting, _)| *waiting != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::{self, Either};
    use futures_util::FutureExt;

    #[test]
    fn check_reflects_state() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());

        token.clone().cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(SqlJsonError::Cancelled)));
    }

    #[test]
    fn cancelled_future_ready_after_cancel() {
        let token = CancelToken::new();
        let mut waiting = token.cancelled();
        assert!((&mut waiting).now_or_never().is_none());

        token.cancel();
        assert!(waiting.now_or_never().is_some());
    }

    #[tokio::test]
    async fn cancel_wakes_pending_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let (outcome, _) = tokio::join!(
            future::select(future::pending::<()>(), waiter.cancelled()),
            async { token.cancel() }
        );

        assert!(matches!(outcome, Either::Right(_)));
    }

    #[test]
    fn dropped_waiters_are_forgotten() {
        let token = CancelToken::new();
        for _ in 0..3 {
            let mut waiting = token.cancelled();
            assert!((&mut waiting).now_or_never().is_none());
        }
        assert!(token.inner.wakers.lock().is_empty());
    }
}
