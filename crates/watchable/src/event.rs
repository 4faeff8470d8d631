#![forbid(unsafe_code)]

//! The record passed to listeners for each intercepted write.

use crate::container::Container;
use crate::value::Value;

/// One intercepted write.
///
/// `old_value` and `new_value` are shallow: when a grandchild of a container
/// slot changes, both may be the same container handle, since containers are
/// observed in place rather than copied.
///
/// For writes to the root slot (`Watchable::set_value`), `property` and
/// `target` are `None` and the values describe the root itself. For writes
/// anywhere below the root they describe the slot that changed, however deep.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub new_value: Value,
    pub old_value: Value,
    /// Key that changed, as a string (array indices included).
    pub property: Option<String>,
    /// The container that holds `property`.
    pub target: Option<Container>,
    /// The watchable's full value at the time of the write.
    pub root: Value,
    /// Resolution of the listener's property path, set only for listeners
    /// whose condition names one.
    pub res: Option<Value>,
}

impl ChangeEvent {
    /// An event describing the current state rather than a write, as handed
    /// to immediately-satisfied waits.
    pub(crate) fn current(value: Value, old_value: Value) -> Self {
        Self {
            new_value: value.clone(),
            old_value,
            property: None,
            target: None,
            root: value,
            res: None,
        }
    }

    #[must_use]
    pub fn is_root_change(&self) -> bool {
        self.property.is_none()
    }

    /// `res` as a number, for predicates like "length at least 3".
    #[must_use]
    pub fn res_f64(&self) -> Option<f64> {
        self.res.as_ref().and_then(Value::as_f64)
    }
}
