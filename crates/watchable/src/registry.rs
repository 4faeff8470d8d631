#![forbid(unsafe_code)]

//! Listener registration: callbacks, conditions, and the registry itself.
//!
//! # Design
//!
//! Listeners are keyed by callback identity. A [`Callback`] is an
//! `Rc`-backed handle; two handles are the same listener exactly when they
//! share an allocation. Keep a clone around if you intend to remove it
//! later.
//!
//! Each registration is stored as a reference-counted entry. Dispatch
//! iterates a snapshot of entries and skips any that are no longer the live
//! registration for their callback, so removals and re-registrations made
//! from inside a callback never cause a skipped or doubled call for the
//! event in flight.
//!
//! # Invariants
//!
//! 1. At most one entry per callback identity.
//! 2. Entries are ordered by their most recent registration.
//! 3. Re-registering replaces options wholesale (no merge).

use std::rc::{Rc, Weak};

use crate::event::ChangeEvent;
use crate::path::PropertyPath;

type ListenerFn = dyn Fn(&ChangeEvent);
type PredicateFn = dyn Fn(&ChangeEvent) -> bool;

/// A registered (or registrable) change listener.
#[derive(Clone)]
pub struct Callback {
    f: Rc<ListenerFn>,
}

impl Callback {
    pub fn new(f: impl Fn(&ChangeEvent) + 'static) -> Self {
        Self { f: Rc::new(f) }
    }

    pub fn call(&self, event: &ChangeEvent) {
        (self.f)(event);
    }

    /// Whether both handles name the same listener.
    #[must_use]
    pub fn ptr_eq(&self, other: &Callback) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.f), Rc::as_ptr(&other.f))
    }

    pub(crate) fn downgrade(&self) -> WeakCallback {
        WeakCallback {
            f: Rc::downgrade(&self.f),
        }
    }
}

impl<F: Fn(&ChangeEvent) + 'static> From<F> for Callback {
    fn from(f: F) -> Self {
        Self::new(f)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Callback {}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.f) as *const ())
    }
}

/// A callback reference that does not keep the closure alive.
pub(crate) struct WeakCallback {
    f: Weak<ListenerFn>,
}

impl WeakCallback {
    pub(crate) fn upgrade(&self) -> Option<Callback> {
        self.f.upgrade().map(|f| Callback { f })
    }
}

/// Gate on a listener: the callback runs only when `predicate` admits the
/// event. With a property path, `event.res` holds the path's resolution
/// when the predicate runs.
#[derive(Clone)]
pub struct Condition {
    property_path: Option<PropertyPath>,
    predicate: Rc<PredicateFn>,
}

impl Condition {
    pub fn new(predicate: impl Fn(&ChangeEvent) -> bool + 'static) -> Self {
        Self {
            property_path: None,
            predicate: Rc::new(predicate),
        }
    }

    pub fn at_path(
        path: PropertyPath,
        predicate: impl Fn(&ChangeEvent) -> bool + 'static,
    ) -> Self {
        Self {
            property_path: Some(path),
            predicate: Rc::new(predicate),
        }
    }

    #[must_use]
    pub fn property_path(&self) -> Option<&PropertyPath> {
        self.property_path.as_ref()
    }

    #[must_use]
    pub fn test(&self, event: &ChangeEvent) -> bool {
        (self.predicate)(event)
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("property_path", &self.property_path.as_ref().map(PropertyPath::as_str))
            .finish_non_exhaustive()
    }
}

/// Options for [`Watchable::add_change_listener`](crate::Watchable::add_change_listener).
///
/// The default is a persistent, ungated listener.
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    /// Unregister after the first invocation that passes the condition.
    pub once: bool,
    pub condition: Option<Condition>,
}

impl ListenerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

pub(crate) struct ListenerEntry {
    callback: Callback,
    options: ListenerOptions,
}

impl ListenerEntry {
    pub(crate) fn callback(&self) -> &Callback {
        &self.callback
    }

    pub(crate) fn is_once(&self) -> bool {
        self.options.once
    }

    pub(crate) fn property_path(&self) -> Option<&PropertyPath> {
        self.options.condition.as_ref()?.property_path()
    }

    /// Whether the condition (if any) lets this event through.
    pub(crate) fn admits(&self, event: &ChangeEvent) -> bool {
        self.options
            .condition
            .as_ref()
            .is_none_or(|condition| condition.test(event))
    }
}

/// Insertion-ordered listener storage.
///
/// Mutators hand back the entries they displace so the caller can drop
/// them after releasing any borrow on the registry: dropping an entry may
/// drop a closure whose captures touch the registry again.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: Vec<Rc<ListenerEntry>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `callback`, replacing and returning any previous entry.
    pub(crate) fn register(
        &mut self,
        callback: Callback,
        options: ListenerOptions,
    ) -> Option<Rc<ListenerEntry>> {
        let replaced = self.remove(&callback);
        self.entries.push(Rc::new(ListenerEntry { callback, options }));
        replaced
    }

    pub(crate) fn remove(&mut self, callback: &Callback) -> Option<Rc<ListenerEntry>> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.callback.ptr_eq(callback))?;
        Some(self.entries.remove(index))
    }

    pub(crate) fn remove_entry(&mut self, entry: &Rc<ListenerEntry>) -> Option<Rc<ListenerEntry>> {
        let index = self.entries.iter().position(|e| Rc::ptr_eq(e, entry))?;
        Some(self.entries.remove(index))
    }

    pub(crate) fn clear(&mut self) -> Vec<Rc<ListenerEntry>> {
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn snapshot(&self) -> Vec<Rc<ListenerEntry>> {
        self.entries.clone()
    }

    /// Whether `entry` is still the registration for its callback.
    pub(crate) fn is_live(&self, entry: &Rc<ListenerEntry>) -> bool {
        self.entries.iter().any(|e| Rc::ptr_eq(e, entry))
    }

    pub(crate) fn contains(&self, callback: &Callback) -> bool {
        self.entries.iter().any(|e| e.callback.ptr_eq(callback))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn event(new_value: i32) -> ChangeEvent {
        ChangeEvent::current(Value::from(new_value), Value::Undefined)
    }

    #[test]
    fn callback_identity_is_allocation_identity() {
        let a = Callback::new(|_| {});
        let b = Callback::new(|_| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn register_replaces_and_moves_to_end() {
        let mut registry = ListenerRegistry::new();
        let a = Callback::new(|_| {});
        let b = Callback::new(|_| {});
        assert!(registry.register(a.clone(), ListenerOptions::new()).is_none());
        registry.register(b.clone(), ListenerOptions::new());
        let replaced = registry.register(a.clone(), ListenerOptions::new().once());
        assert!(replaced.is_some_and(|entry| !entry.is_once()));
        assert_eq!(registry.len(), 2);

        let order: Vec<Callback> = registry
            .snapshot()
            .iter()
            .map(|entry| entry.callback().clone())
            .collect();
        assert_eq!(order, vec![b, a.clone()]);
        assert!(registry.snapshot()[1].is_once());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = ListenerRegistry::new();
        let a = Callback::new(|_| {});
        assert!(registry.remove(&a).is_none());
        registry.register(a.clone(), ListenerOptions::new());
        assert!(registry.remove(&a).is_some());
        assert!(registry.remove(&a).is_none());
        assert!(!registry.contains(&a));
    }

    #[test]
    fn snapshot_entries_go_stale_on_removal_and_reregistration() {
        let mut registry = ListenerRegistry::new();
        let a = Callback::new(|_| {});
        registry.register(a.clone(), ListenerOptions::new());
        let snapshot = registry.snapshot();
        assert!(registry.is_live(&snapshot[0]));

        registry.register(a.clone(), ListenerOptions::new());
        assert!(!registry.is_live(&snapshot[0]));
        assert!(registry.contains(&a));
    }

    #[test]
    fn condition_gates_admission() {
        let gated = ListenerEntry {
            callback: Callback::new(|_| {}),
            options: ListenerOptions::new()
                .condition(Condition::new(|e| e.new_value == Value::from(2))),
        };
        assert!(!gated.admits(&event(1)));
        assert!(gated.admits(&event(2)));

        let open = ListenerEntry {
            callback: Callback::new(|_| {}),
            options: ListenerOptions::new(),
        };
        assert!(open.admits(&event(1)));
    }

    #[test]
    fn clear_hands_back_everything() {
        let mut registry = ListenerRegistry::new();
        registry.register(Callback::new(|_| {}), ListenerOptions::new());
        registry.register(Callback::new(|_| {}), ListenerOptions::new().once());
        assert_eq!(registry.clear().len(), 2);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn condition_debug_shows_path() {
        let path = PropertyPath::parse("a.b").expect("valid");
        let condition = Condition::at_path(path, |_| true);
        assert!(format!("{condition:?}").contains("a.b"));
    }
}
