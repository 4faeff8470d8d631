#![forbid(unsafe_code)]

//! The root entity: a deeply observed value with listeners and conditional
//! waits.
//!
//! # Architecture
//!
//! A [`Watchable`] is a cheap handle to shared state (`Rc`). The root value
//! lives under a single synthetic key of an internal object container, so a
//! primitive root is observed exactly like a nested slot. Every container
//! reachable from the root reports its writes back to the shared state,
//! which dispatches them synchronously, inline with the write.
//!
//! # Invariants
//!
//! 1. Listeners run in the order of their most recent registration.
//! 2. Writing a value strictly equal to the current one notifies nobody and
//!    leaves `version()` unchanged.
//! 3. `version()` increments exactly once per dispatched change.
//! 4. `old_value()` is the value displaced by the most recent intercepted
//!    write anywhere in the graph, including suppressed ones.
//! 5. No borrow of the shared state is held while user code runs, so
//!    callbacks may write to the watchable, register, or remove listeners.
//!
//! # Failure Modes
//!
//! - **Listener captures its own watchable**: the `Rc` cycle keeps both
//!   alive until `clear_listeners()` (or removal) breaks it.
//! - **Condition that never holds**: a deferred `when` stays registered for
//!   the watchable's lifetime.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::container::Container;
use crate::error::{Result, WatchError};
use crate::event::ChangeEvent;
use crate::path::PropertyPath;
use crate::registry::{Callback, Condition, ListenerOptions, ListenerRegistry};
use crate::subscription::Subscription;
use crate::value::Value;
use crate::wait::WhenFuture;

/// Key of the synthetic slot that holds the root value.
const ROOT_KEY: &str = "value";

/// Shared interior of a [`Watchable`].
pub(crate) struct WatchState {
    this: Weak<WatchState>,
    /// Synthetic `{ value: … }` container.
    root: Container,
    listeners: RefCell<ListenerRegistry>,
    /// Value displaced by the most recent intercepted write.
    old_value: RefCell<Value>,
    /// Bumped once per dispatched change.
    version: Cell<u64>,
}

impl WatchState {
    fn current(&self) -> Value {
        self.root.get(ROOT_KEY)
    }

    pub(crate) fn record_old_value(&self, value: Value) {
        // Swap out first so the displaced value drops outside the borrow.
        let _previous = self.old_value.replace(value);
    }

    /// Adopt `value` into this watchable if it is a container.
    pub(crate) fn adopt(&self, value: &Value) {
        if let Value::Container(container) = value {
            container.adopt(&self.this);
        }
    }

    /// Build the event for an applied write on `target` and run listeners.
    pub(crate) fn dispatch(
        &self,
        target: &Container,
        property: String,
        new_value: Value,
        old_value: Value,
    ) {
        let (property, target) = if target.ptr_eq(&self.root) {
            (None, None)
        } else {
            (Some(property), Some(target.clone()))
        };
        let event = ChangeEvent {
            new_value,
            old_value,
            property,
            target,
            root: self.current(),
            res: None,
        };
        self.run_callbacks(event);
    }

    fn run_callbacks(&self, mut event: ChangeEvent) {
        let version = self.version.get() + 1;
        self.version.set(version);

        let snapshot = self.listeners.borrow().snapshot();
        tracing::trace!(
            message = "watchable.dispatch",
            property = event.property.as_deref().unwrap_or("<root>"),
            listeners = snapshot.len(),
            version
        );

        for entry in snapshot {
            if !self.listeners.borrow().is_live(&entry) {
                continue;
            }
            event.res = entry.property_path().and_then(|path| {
                let root = self.current();
                root.is_container().then(|| path.resolve(&root).value)
            });
            if !entry.admits(&event) {
                continue;
            }
            if entry.is_once() {
                let _consumed = self.listeners.borrow_mut().remove_entry(&entry);
                tracing::trace!(message = "watchable.once_consumed", version);
            }
            entry.callback().call(&event);
        }
    }

    pub(crate) fn register(&self, callback: Callback, options: ListenerOptions) {
        let _replaced = self.listeners.borrow_mut().register(callback, options);
    }

    pub(crate) fn unregister(&self, callback: &Callback) -> bool {
        let removed = self.listeners.borrow_mut().remove(callback);
        removed.is_some()
    }
}

/// A value whose every change, at any depth, can be listened for.
///
/// Cloning a `Watchable` creates a new handle to the **same** state.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use watchable::{Callback, ListenerOptions, Value, Watchable};
///
/// let watched = Watchable::new(serde_json::json!({"a": {"b": 1}}));
/// let seen = Rc::new(Cell::new(0.0));
/// let sink = Rc::clone(&seen);
/// watched.add_change_listener(
///     Callback::new(move |e| sink.set(e.new_value.as_f64().unwrap_or(0.0))),
///     ListenerOptions::new(),
/// );
///
/// let root = watched.value();
/// let a = root.as_container().unwrap().get("a");
/// a.as_container().unwrap().set("b", 2);
/// assert_eq!(seen.get(), 2.0);
/// ```
#[derive(Clone)]
pub struct Watchable {
    state: Rc<WatchState>,
}

impl std::fmt::Debug for Watchable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchable")
            .field("value", &self.value())
            .field("version", &self.version())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Default for Watchable {
    fn default() -> Self {
        Self::new(Value::Undefined)
    }
}

impl Watchable {
    /// Watch `initial`. Containers in it are adopted; no event is dispatched.
    pub fn new(initial: impl Into<Value>) -> Self {
        let initial = initial.into();
        let state = Rc::new_cyclic(|this: &Weak<WatchState>| {
            let root = Container::object();
            root.adopt(this);
            if let Value::Container(container) = &initial {
                container.adopt(this);
            }
            root.insert_raw(ROOT_KEY, initial);
            WatchState {
                this: this.clone(),
                root,
                listeners: RefCell::new(ListenerRegistry::new()),
                old_value: RefCell::new(Value::Undefined),
                version: Cell::new(0),
            }
        });
        Self { state }
    }

    /// The current root value. Containers come back as live handles.
    #[must_use]
    pub fn value(&self) -> Value {
        self.state.current()
    }

    /// Replace the root value, dispatching if it changed.
    pub fn set_value(&self, value: impl Into<Value>) {
        self.state.root.set(ROOT_KEY, value);
    }

    /// The value displaced by the most recent intercepted write.
    #[must_use]
    pub fn old_value(&self) -> Value {
        self.state.old_value.borrow().clone()
    }

    /// Number of changes dispatched so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.version.get()
    }

    /// Register `callback`, replacing any earlier registration of the same
    /// callback (options are replaced, not merged).
    pub fn add_change_listener(&self, callback: impl Into<Callback>, options: ListenerOptions) {
        self.state.register(callback.into(), options);
    }

    /// Remove `callback`. Returns whether it was registered.
    pub fn remove_change_listener(&self, callback: &Callback) -> bool {
        self.state.unregister(callback)
    }

    pub fn clear_listeners(&self) {
        let drained = self.state.listeners.borrow_mut().clear();
        drop(drained);
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.listeners.borrow().len()
    }

    #[must_use]
    pub fn has_listener(&self, callback: &Callback) -> bool {
        self.state.listeners.borrow().contains(callback)
    }

    /// Register a persistent listener that is removed when the returned
    /// guard drops.
    pub fn subscribe(&self, callback: impl Into<Callback>) -> Subscription {
        let callback = callback.into();
        self.state.register(callback.clone(), ListenerOptions::new());
        Subscription::new(Rc::downgrade(&self.state), callback)
    }

    pub(crate) fn downgrade(&self) -> Weak<WatchState> {
        Rc::downgrade(&self.state)
    }

    // ── Conditional waits ────────────────────────────────────────────

    /// Run `callback` once `predicate` holds.
    ///
    /// The predicate is first tried against the current state (an event
    /// with `new_value` and `root` set to the current value). If it holds,
    /// `callback` runs before `when` returns; otherwise it is registered as
    /// a one-shot listener gated by `predicate`.
    pub fn when(
        &self,
        predicate: impl Fn(&ChangeEvent) -> bool + 'static,
        callback: impl Into<Callback>,
    ) {
        let event = self.current_event();
        self.settle(Condition::new(predicate), &event, callback.into());
    }

    /// Run `callback` once the root value is strictly equal to `expected`.
    pub fn when_equals(&self, expected: impl Into<Value>, callback: impl Into<Callback>) {
        let expected = expected.into();
        let callback = callback.into();
        if self.value().strict_eq(&expected) {
            self.fire_now(&callback, &self.current_event());
            return;
        }
        self.defer(
            callback,
            Condition::new(move |e| e.new_value.strict_eq(&expected)),
        );
    }

    /// Run `callback` once the value at `path` is strictly equal to
    /// `expected`.
    ///
    /// # Errors
    ///
    /// [`WatchError::InvalidPath`] if `path` does not parse,
    /// [`WatchError::NotAnObject`] if the root is not a container.
    pub fn when_path_equals(
        &self,
        path: &str,
        expected: impl Into<Value>,
        callback: impl Into<Callback>,
    ) -> Result<()> {
        let path = PropertyPath::parse(path)?;
        let event = self.path_event(&path)?;
        let expected = expected.into();
        let condition = Condition::at_path(path, move |e| {
            e.res.as_ref().is_some_and(|res| res.strict_eq(&expected))
        });
        self.settle(condition, &event, callback.into());
        Ok(())
    }

    /// Run `callback` once `predicate` holds for the value at `path`
    /// (available to the predicate as `event.res`).
    ///
    /// # Errors
    ///
    /// [`WatchError::InvalidPath`] if `path` does not parse,
    /// [`WatchError::NotAnObject`] if the root is not a container.
    pub fn when_path(
        &self,
        path: &str,
        predicate: impl Fn(&ChangeEvent) -> bool + 'static,
        callback: impl Into<Callback>,
    ) -> Result<()> {
        let path = PropertyPath::parse(path)?;
        let event = self.path_event(&path)?;
        self.settle(Condition::at_path(path, predicate), &event, callback.into());
        Ok(())
    }

    /// Awaitable form of [`when`](Self::when).
    pub fn promise_when(&self, predicate: impl Fn(&ChangeEvent) -> bool + 'static) -> WhenFuture {
        let (future, callback) = WhenFuture::pending(self);
        self.when(predicate, callback);
        future
    }

    /// Awaitable form of [`when_equals`](Self::when_equals).
    pub fn promise_when_equals(&self, expected: impl Into<Value>) -> WhenFuture {
        let (future, callback) = WhenFuture::pending(self);
        self.when_equals(expected, callback);
        future
    }

    /// Awaitable form of [`when_path_equals`](Self::when_path_equals).
    ///
    /// # Errors
    ///
    /// As for `when_path_equals`, reported before any future exists.
    pub fn promise_when_path_equals(
        &self,
        path: &str,
        expected: impl Into<Value>,
    ) -> Result<WhenFuture> {
        let (future, callback) = WhenFuture::pending(self);
        self.when_path_equals(path, expected, callback)?;
        Ok(future)
    }

    /// Awaitable form of [`when_path`](Self::when_path).
    ///
    /// # Errors
    ///
    /// As for `when_path`, reported before any future exists.
    pub fn promise_when_path(
        &self,
        path: &str,
        predicate: impl Fn(&ChangeEvent) -> bool + 'static,
    ) -> Result<WhenFuture> {
        let (future, callback) = WhenFuture::pending(self);
        self.when_path(path, predicate, callback)?;
        Ok(future)
    }

    fn current_event(&self) -> ChangeEvent {
        ChangeEvent::current(self.value(), self.old_value())
    }

    /// The event a path wait sees right now: the resolved leaf as `res` and
    /// `new_value`, its parent and key as `target` and `property`.
    fn path_event(&self, path: &PropertyPath) -> Result<ChangeEvent> {
        let root = self.value();
        if !root.is_container() {
            return Err(WatchError::not_an_object(path.as_str(), root.type_name()));
        }
        let resolution = path.resolve(&root);
        Ok(ChangeEvent {
            new_value: resolution.value.clone(),
            old_value: self.old_value(),
            property: path.leaf_key().map(str::to_owned),
            target: resolution.parent,
            root,
            res: Some(resolution.value),
        })
    }

    fn settle(&self, condition: Condition, event: &ChangeEvent, callback: Callback) {
        if condition.test(event) {
            self.fire_now(&callback, event);
        } else {
            self.defer(callback, condition);
        }
    }

    fn fire_now(&self, callback: &Callback, event: &ChangeEvent) {
        tracing::debug!(
            message = "watchable.when_immediate",
            path = event.property.as_deref().unwrap_or("<root>")
        );
        callback.call(event);
    }

    fn defer(&self, callback: Callback, condition: Condition) {
        tracing::debug!(
            message = "watchable.when_deferred",
            path = condition.property_path().map_or("<root>", PropertyPath::as_str)
        );
        self.state
            .register(callback, ListenerOptions::new().once().condition(condition));
    }
}
