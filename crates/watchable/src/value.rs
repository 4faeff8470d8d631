#![forbid(unsafe_code)]

//! Dynamic value model for watched graphs.
//!
//! A [`Value`] is either a primitive or a [`Container`] handle. Containers
//! are shared: cloning a `Value::Container` clones the handle, never the
//! data, so a value read out of a [`Watchable`](crate::Watchable) is a live
//! reference into the observed graph.
//!
//! # Equality
//!
//! [`Value::strict_eq`] (and `PartialEq`) compare primitives by value and
//! containers by identity. Two structurally identical but distinct
//! containers are *not* equal, and `NaN` is never equal to itself.

use serde_json::Value as Json;

use crate::container::{Container, ContainerKind};

/// Largest integer magnitude an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A value of arbitrary shape.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The uninitialized / missing value.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// An object or array.
    Container(Container),
}

impl Value {
    /// Identity/value equality used for no-op suppression and `when`
    /// comparisons.
    #[must_use]
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Container(a), Value::Container(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Container(_))
    }

    #[must_use]
    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Value::Container(container) => Some(container),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short lowercase name of the value's kind, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Container(c) if c.is_array() => "array",
            Value::Container(_) => "object",
        }
    }

    /// Snapshot the graph into plain JSON.
    ///
    /// `Undefined` and non-finite numbers become `null`. A container that
    /// appears again beneath itself (a cycle) is emitted as `null` at the
    /// back-edge.
    #[must_use]
    pub fn to_json(&self) -> Json {
        let mut ancestors = Vec::new();
        self.to_json_inner(&mut ancestors)
    }

    fn to_json_inner(&self, ancestors: &mut Vec<usize>) -> Json {
        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::Container(container) => {
                let addr = container.addr();
                if ancestors.contains(&addr) {
                    return Json::Null;
                }
                ancestors.push(addr);
                let json = match container.kind() {
                    ContainerKind::Array => Json::Array(
                        container
                            .values()
                            .iter()
                            .map(|v| v.to_json_inner(ancestors))
                            .collect(),
                    ),
                    ContainerKind::Object => Json::Object(
                        container
                            .entries()
                            .into_iter()
                            .map(|(k, v)| (k, v.to_json_inner(ancestors)))
                            .collect(),
                    ),
                };
                ancestors.pop();
                json
            }
        }
    }
}

fn number_to_json(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Json::Null, Json::Number)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Container> for Value {
    fn from(container: Container) -> Self {
        Value::Container(container)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Undefined, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Container(Container::from_values(items.into_iter().map(Into::into)))
    }
}

/// Builds a fresh, unobserved graph.
impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s),
            Json::Array(items) => {
                Value::Container(Container::from_values(items.into_iter().map(Value::from)))
            }
            Json::Object(map) => Value::Container(Container::from_entries(
                map.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}
