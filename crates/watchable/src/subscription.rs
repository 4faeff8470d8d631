#![forbid(unsafe_code)]

//! RAII listener registration.

use std::rc::Weak;

use crate::registry::Callback;
use crate::watchable::WatchState;

/// Keeps a listener registered for as long as it lives.
///
/// Returned by [`Watchable::subscribe`](crate::Watchable::subscribe).
/// Dropping the guard removes the listener; [`detach`](Self::detach) leaves
/// it registered for the watchable's lifetime instead.
#[must_use = "dropping a Subscription removes its listener immediately"]
pub struct Subscription {
    owner: Option<Weak<WatchState>>,
    callback: Callback,
}

impl Subscription {
    pub(crate) fn new(owner: Weak<WatchState>, callback: Callback) -> Self {
        Self {
            owner: Some(owner),
            callback,
        }
    }

    /// The registered callback, usable with `remove_change_listener`.
    #[must_use]
    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Give up the guard without unregistering.
    pub fn detach(mut self) {
        self.owner = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.owner.take().and_then(|owner| owner.upgrade()) {
            state.unregister(&self.callback);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("callback", &self.callback)
            .field("attached", &self.owner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::Watchable;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn drop_unsubscribes() {
        let w = Watchable::new(0);
        let hits = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&hits);
        let sub = w.subscribe(move |_: &crate::ChangeEvent| counter.set(counter.get() + 1));

        w.set_value(1);
        assert_eq!(hits.get(), 1);

        drop(sub);
        w.set_value(2);
        assert_eq!(hits.get(), 1);
        assert_eq!(w.listener_count(), 0);
    }

    #[test]
    fn detach_keeps_listener() {
        let w = Watchable::new(0);
        let sub = w.subscribe(|_: &crate::ChangeEvent| {});
        let callback = sub.callback().clone();
        sub.detach();
        assert!(w.has_listener(&callback));
    }

    #[test]
    fn drop_after_watchable_is_gone_is_harmless() {
        let w = Watchable::new(0);
        let sub = w.subscribe(|_: &crate::ChangeEvent| {});
        drop(w);
        drop(sub);
    }

    #[test]
    fn subscription_dropped_inside_callback() {
        let w = Watchable::new(0);
        let slot: Rc<Cell<Option<super::Subscription>>> = Rc::new(Cell::new(None));
        let inner_slot = Rc::clone(&slot);
        let sub = w.subscribe(move |_: &crate::ChangeEvent| drop(inner_slot.take()));
        slot.set(Some(sub));

        w.set_value(1);
        assert_eq!(w.listener_count(), 0);
    }
}
