#![forbid(unsafe_code)]

//! Awaitable conditional waits.
//!
//! A [`WhenFuture`] is the receiving half of a single-shot channel whose
//! sending half lives inside a one-shot listener. It completes when that
//! listener fires, which for an already-satisfied condition happens before
//! the future is even returned; the completion is still only observed on the
//! first poll.
//!
//! If the listener is dropped unfired (removed, cleared, or its watchable
//! dropped), the channel closes and the future completes with
//! [`WatchError::Abandoned`]. Dropping the future itself does not unregister
//! anything; call [`WhenFuture::cancel`] for that.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Weak;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::error::WatchError;
use crate::registry::{Callback, WeakCallback};
use crate::watchable::{WatchState, Watchable};

/// Completes once its condition holds.
#[must_use = "futures do nothing unless polled"]
pub struct WhenFuture {
    receiver: oneshot::Receiver<()>,
    owner: Weak<WatchState>,
    callback: WeakCallback,
}

impl WhenFuture {
    /// A future plus the callback that completes it.
    pub(crate) fn pending(watchable: &Watchable) -> (Self, Callback) {
        let (sender, receiver) = oneshot::channel();
        let sender = Cell::new(Some(sender));
        let callback = Callback::new(move |_| {
            if let Some(sender) = sender.take() {
                let _ = sender.send(());
            }
        });
        let future = Self {
            receiver,
            owner: watchable.downgrade(),
            callback: callback.downgrade(),
        };
        (future, callback)
    }

    /// Unregister the pending listener, if it has not fired yet.
    pub fn cancel(self) {
        let (Some(state), Some(callback)) = (self.owner.upgrade(), self.callback.upgrade()) else {
            return;
        };
        state.unregister(&callback);
    }
}

impl std::fmt::Debug for WhenFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhenFuture")
            .field("pending", &self.callback.upgrade().is_some())
            .finish()
    }
}

impl Future for WhenFuture {
    type Output = Result<(), WatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|outcome| outcome.map_err(|_| WatchError::Abandoned))
    }
}
