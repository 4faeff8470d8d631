#![forbid(unsafe_code)]

//! Deeply observed values.
//!
//! A [`Watchable`] holds a value of arbitrary shape (a primitive, or a graph
//! of objects and arrays) and notifies listeners whenever it, or any slot
//! reachable from it, changes. On top of that it offers conditional waits:
//! run a callback, or complete a future, once a condition over the value
//! holds, immediately if it already does.
//!
//! - [`Value`] / [`Container`]: the value model. Containers are shared
//!   handles whose writes are intercepted once they are reachable from a
//!   watchable.
//! - [`PropertyPath`]: `a.b["c d"][0]`-style paths resolved against a value.
//! - [`Callback`], [`Condition`], [`ListenerOptions`]: listener registration,
//!   keyed by callback identity.
//! - [`Watchable::when`] and friends, [`WhenFuture`]: conditional waits.
//!
//! # Dispatch model
//!
//! Everything is single-threaded and synchronous. A write dispatches to
//! every matching listener before it returns; listeners may write to the
//! same watchable, which dispatches again, nested on the call stack. The
//! only deferred piece is a [`WhenFuture`], whose completion is observed
//! when it is next polled.
//!
//! # Example
//!
//! ```
//! use watchable::{Callback, Watchable};
//!
//! let profile = Watchable::new(serde_json::json!({"q": {"interests": ["a", "b"]}}));
//! let done = std::rc::Rc::new(std::cell::Cell::new(false));
//! let flag = done.clone();
//! profile
//!     .when_path(
//!         "q.interests.length",
//!         |e| e.res_f64().is_some_and(|n| n >= 3.0),
//!         Callback::new(move |_| flag.set(true)),
//!     )
//!     .unwrap();
//! assert!(!done.get());
//!
//! let q = profile.value().as_container().unwrap().get("q");
//! let interests = q.as_container().unwrap().get("interests");
//! interests.as_container().unwrap().push("c");
//! assert!(done.get());
//! ```

pub mod container;
pub mod error;
pub mod event;
pub mod path;
pub mod registry;
pub mod subscription;
pub mod value;
pub mod wait;
pub mod watchable;

pub use container::{Container, ContainerKind};
pub use error::{PathError, Result, WatchError};
pub use event::ChangeEvent;
pub use path::{PropertyPath, Resolution};
pub use registry::{Callback, Condition, ListenerOptions};
pub use subscription::Subscription;
pub use value::Value;
pub use wait::WhenFuture;
pub use watchable::Watchable;
