#![forbid(unsafe_code)]

//! Observed objects and arrays.
//!
//! A [`Container`] is a shared handle to an object (insertion-ordered string
//! keys) or an array (index keys plus `length`). Every write goes through
//! the handle, which is where change interception happens.
//!
//! # Design
//!
//! A container starts out *unobserved*: writes apply silently. Once it
//! becomes reachable from a [`Watchable`](crate::Watchable), it and every
//! container nested in it are adopted by that watchable, top-down. From
//! then on each write
//!
//! 1. records the slot's previous value as the watchable's `old_value`,
//! 2. stops there if the new value is strictly equal to the old one,
//! 3. adopts the new value if it is itself a container, then stores it,
//! 4. dispatches a [`ChangeEvent`](crate::ChangeEvent).
//!
//! # Invariants
//!
//! 1. A container is adopted at most once. Adoption stops at containers the
//!    same watchable already owns, so cyclic graphs terminate.
//! 2. Arrays never hold holes: writes past the end pad with `Undefined`.
//! 3. `push` dispatches twice (index, then `length`); `pop` once (`length`).
//! 4. Arrays stay below 2^32 - 1 elements. Out-of-range or unallocatable
//!    array writes are rejected before any of the steps above run.
//!
//! # Failure Modes
//!
//! - **Owner dropped**: writes to a container whose watchable is gone apply
//!   silently, as if it had never been observed. Attaching it to another
//!   watchable re-adopts it.
//! - **Foreign owner**: a container still owned by a live watchable is not
//!   re-adopted when attached to a second one; its writes keep notifying
//!   the first.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::value::Value;
use crate::watchable::WatchState;

/// Longest array a write may produce; indices stop one below it.
const MAX_ARRAY_LENGTH: usize = 4_294_967_295;

/// Whether a container is keyed by name or by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Array,
}

#[derive(Debug)]
enum Slots {
    Object(IndexMap<String, Value>),
    Array(Vec<Value>),
}

impl Slots {
    fn child_containers(&self) -> Vec<Container> {
        let values: Box<dyn Iterator<Item = &Value>> = match self {
            Slots::Object(map) => Box::new(map.values()),
            Slots::Array(items) => Box::new(items.iter()),
        };
        values.filter_map(|v| v.as_container().cloned()).collect()
    }
}

struct ContainerInner {
    slots: Slots,
    /// The watchable this container reports writes to.
    observer: Option<Weak<WatchState>>,
}

/// A write target inside an array.
enum ArraySlot {
    Index(usize),
    Length,
}

/// Shared handle to an object or array.
///
/// Cloning creates a new handle to the **same** storage.
#[derive(Clone)]
pub struct Container {
    inner: Rc<RefCell<ContainerInner>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Shallow on purpose: graphs may be cyclic.
        f.debug_struct("Container")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .field("observed", &self.is_observed())
            .finish()
    }
}

impl Container {
    fn with_slots(slots: Slots) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ContainerInner {
                slots,
                observer: None,
            })),
        }
    }

    /// An empty, unobserved object.
    #[must_use]
    pub fn object() -> Self {
        Self::with_slots(Slots::Object(IndexMap::new()))
    }

    /// An empty, unobserved array.
    #[must_use]
    pub fn array() -> Self {
        Self::with_slots(Slots::Array(Vec::new()))
    }

    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::with_slots(Slots::Object(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::with_slots(Slots::Array(values.into_iter().collect()))
    }

    #[must_use]
    pub fn kind(&self) -> ContainerKind {
        match self.inner.borrow().slots {
            Slots::Object(_) => ContainerKind::Object,
            Slots::Array(_) => ContainerKind::Array,
        }
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.kind() == ContainerKind::Array
    }

    /// Number of keys (objects) or the array length.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.inner.borrow().slots {
            Slots::Object(map) => map.len(),
            Slots::Array(items) => items.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a property. Missing keys read as `Undefined`; arrays answer
    /// `length` and canonical index keys.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        match &self.inner.borrow().slots {
            Slots::Object(map) => map.get(key).cloned().unwrap_or_default(),
            Slots::Array(items) => match array_slot(key) {
                Some(ArraySlot::Length) => Value::Number(items.len() as f64),
                Some(ArraySlot::Index(i)) => items.get(i).cloned().unwrap_or_default(),
                None => Value::Undefined,
            },
        }
    }

    /// Read an array element by position. Objects always answer `Undefined`.
    #[must_use]
    pub fn at(&self, index: usize) -> Value {
        match &self.inner.borrow().slots {
            Slots::Array(items) => items.get(index).cloned().unwrap_or_default(),
            Slots::Object(_) => Value::Undefined,
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        match &self.inner.borrow().slots {
            Slots::Object(map) => map.contains_key(key),
            Slots::Array(items) => match array_slot(key) {
                Some(ArraySlot::Length) => true,
                Some(ArraySlot::Index(i)) => i < items.len(),
                None => false,
            },
        }
    }

    /// Own keys in order. Arrays list their indices (not `length`).
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        match &self.inner.borrow().slots {
            Slots::Object(map) => map.keys().cloned().collect(),
            Slots::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        }
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        match &self.inner.borrow().slots {
            Slots::Object(map) => map.values().cloned().collect(),
            Slots::Array(items) => items.clone(),
        }
    }

    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        match &self.inner.borrow().slots {
            Slots::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Slots::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
        }
    }

    /// Write a property.
    ///
    /// On arrays, `key` must be a canonical index or `length`; anything else
    /// is rejected with a warning and leaves the array untouched.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if !self.is_array() {
            self.intercept(key.clone(), value, move |slots, value| {
                if let Slots::Object(map) = slots {
                    map.insert(key, value);
                }
            });
            return;
        }
        match array_slot(&key) {
            Some(ArraySlot::Index(index)) => self.set_at(index, value),
            Some(ArraySlot::Length) => self.set_length(value),
            None => {
                tracing::warn!(
                    message = "watchable.array_write_rejected",
                    key = %key,
                    reason = "not an index"
                );
            }
        }
    }

    /// Write an array element, padding with `Undefined` past the end.
    pub fn set_at(&self, index: usize, value: impl Into<Value>) {
        if !self.is_array() {
            self.set(index.to_string(), value);
            return;
        }
        let Some(needed) = index.checked_add(1).filter(|&len| len <= MAX_ARRAY_LENGTH) else {
            tracing::warn!(
                message = "watchable.array_write_rejected",
                index,
                reason = "index out of range"
            );
            return;
        };
        if !self.reserve(needed) {
            return;
        }
        self.intercept(index.to_string(), value.into(), move |slots, value| {
            if let Slots::Array(items) = slots {
                if needed > items.len() {
                    items.resize(needed, Value::Undefined);
                }
                items[index] = value;
            }
        });
    }

    fn set_length(&self, value: Value) {
        let length = match value.as_f64() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= MAX_ARRAY_LENGTH as f64 => {
                n as usize
            }
            _ => {
                tracing::warn!(
                    message = "watchable.array_write_rejected",
                    key = "length",
                    reason = "invalid length",
                    found = value.type_name()
                );
                return;
            }
        };
        if !self.reserve(length) {
            return;
        }
        self.intercept("length".to_owned(), value, move |slots, _| {
            if let Slots::Array(items) = slots {
                items.resize(length, Value::Undefined);
            }
        });
    }

    /// Append to an array and return the new length.
    ///
    /// Dispatches the index write, then a `length` write whose old value is
    /// the length before the push. Objects reject the call.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        if !self.is_array() {
            tracing::warn!(
                message = "watchable.array_write_rejected",
                key = "push",
                reason = "not an array"
            );
            return self.len();
        }
        let old_len = self.len();
        self.set_at(old_len, value);
        let new_len = self.len();
        self.announce("length".to_owned(), Value::from(new_len), Value::from(old_len));
        new_len
    }

    /// Remove and return the last element of an array.
    pub fn pop(&self) -> Value {
        let old_len = self.len();
        let removed = match &mut self.inner.borrow_mut().slots {
            Slots::Array(items) => items.pop(),
            Slots::Object(_) => None,
        };
        if !self.is_array() {
            return Value::Undefined;
        }
        self.announce(
            "length".to_owned(),
            Value::from(self.len()),
            Value::from(old_len),
        );
        removed.unwrap_or_default()
    }

    /// Delete an object key, returning its previous value.
    ///
    /// A deletion is reported as a write of `Undefined`. Arrays reject the
    /// call; shrink them with `pop` or a `length` write instead.
    pub fn remove(&self, key: &str) -> Value {
        let removed = match &mut self.inner.borrow_mut().slots {
            Slots::Object(map) => map.shift_remove(key),
            Slots::Array(_) => {
                tracing::warn!(
                    message = "watchable.array_write_rejected",
                    key = %key,
                    reason = "remove on array"
                );
                None
            }
        };
        let Some(old_value) = removed else {
            return Value::Undefined;
        };
        self.announce(key.to_owned(), Value::Undefined, old_value.clone());
        old_value
    }

    /// Whether writes to this container currently dispatch change events.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.observer().is_some()
    }

    /// Whether two handles point at the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    fn observer(&self) -> Option<Rc<WatchState>> {
        self.inner.borrow().observer.as_ref().and_then(Weak::upgrade)
    }

    /// Make room for `len` elements before a write, so growth fails as a
    /// rejected write instead of an aborted allocation.
    fn reserve(&self, len: usize) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Slots::Array(items) = &mut inner.slots else {
            return true;
        };
        let additional = len.saturating_sub(items.len());
        if let Err(err) = items.try_reserve(additional) {
            tracing::warn!(
                message = "watchable.array_write_rejected",
                len,
                reason = "allocation failed",
                error = %err
            );
            return false;
        }
        true
    }

    /// Store without interception. Only used while a watchable is being
    /// constructed.
    pub(crate) fn insert_raw(&self, key: &str, value: Value) {
        if let Slots::Object(map) = &mut self.inner.borrow_mut().slots {
            map.insert(key.to_owned(), value);
        }
    }

    /// Adopt this container and everything nested in it into `owner`.
    pub(crate) fn adopt(&self, owner: &Weak<WatchState>) {
        let children = {
            let mut inner = self.inner.borrow_mut();
            let owned = inner
                .observer
                .as_ref()
                .is_some_and(|current| current.ptr_eq(owner) || current.strong_count() > 0);
            if owned {
                return;
            }
            inner.observer = Some(owner.clone());
            inner.slots.child_containers()
        };
        for child in children {
            child.adopt(owner);
        }
    }

    /// Run one intercepted write: record, suppress, adopt, store, dispatch.
    fn intercept(&self, property: String, value: Value, store: impl FnOnce(&mut Slots, Value)) {
        let Some(state) = self.observer() else {
            store(&mut self.inner.borrow_mut().slots, value);
            return;
        };
        let old_value = self.get(&property);
        state.record_old_value(old_value.clone());
        if value.strict_eq(&old_value) {
            store(&mut self.inner.borrow_mut().slots, value);
            tracing::trace!(message = "watchable.suppressed", property = %property);
            return;
        }
        state.adopt(&value);
        store(&mut self.inner.borrow_mut().slots, value.clone());
        state.dispatch(self, property, value, old_value);
    }

    /// Report a change that has already been applied to storage.
    fn announce(&self, property: String, new_value: Value, old_value: Value) {
        let Some(state) = self.observer() else {
            return;
        };
        state.record_old_value(old_value.clone());
        if new_value.strict_eq(&old_value) {
            tracing::trace!(message = "watchable.suppressed", property = %property);
            return;
        }
        state.dispatch(self, property, new_value, old_value);
    }
}

/// Parse an array key. Only canonical decimal indices (no sign, no leading
/// zeros) address elements.
fn array_slot(key: &str) -> Option<ArraySlot> {
    if key == "length" {
        return Some(ArraySlot::Length);
    }
    let canonical = !key.is_empty()
        && key.bytes().all(|b| b.is_ascii_digit())
        && (key.len() == 1 || !key.starts_with('0'));
    if !canonical {
        return None;
    }
    key.parse().ok().map(ArraySlot::Index)
}
