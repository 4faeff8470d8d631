#![forbid(unsafe_code)]

//! Structured log events emitted by dispatch, waits and path resolution.

use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use watchable::{Callback, ListenerOptions, PropertyPath, Watchable};

#[derive(Default)]
struct Captured {
    messages: Vec<(tracing::Level, String)>,
}

struct MessageCapture {
    state: Arc<Mutex<Captured>>,
}

impl<S> Layer<S> for MessageCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.state
                .lock()
                .expect("capture lock")
                .messages
                .push((*event.metadata().level(), message));
        }
    }
}

fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<(tracing::Level, String)>) {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(MessageCapture {
        state: Arc::clone(&state),
    });
    let result = {
        let _guard = tracing::subscriber::set_default(subscriber);
        f()
    };
    let messages = std::mem::take(&mut state.lock().expect("capture lock").messages);
    (result, messages)
}

fn saw(messages: &[(tracing::Level, String)], level: tracing::Level, name: &str) -> bool {
    messages.iter().any(|(l, m)| *l == level && m == name)
}

#[test]
fn stepping_into_a_primitive_logs_path_unresolved() {
    let root = watchable::Value::from(json!({"a": 5}));
    let path = PropertyPath::parse("a.b.c").expect("valid");

    let (resolution, messages) = capture(|| path.resolve(&root));

    assert!(resolution.value.is_undefined());
    assert!(
        saw(&messages, tracing::Level::DEBUG, "watchable.path_unresolved"),
        "expected watchable.path_unresolved, got {messages:?}"
    );
}

#[test]
fn missing_key_is_not_logged() {
    let root = watchable::Value::from(json!({"a": {}}));
    let path = PropertyPath::parse("a.missing").expect("valid");

    let (_, messages) = capture(|| path.resolve(&root));

    assert!(!saw(&messages, tracing::Level::DEBUG, "watchable.path_unresolved"));
}

#[test]
fn dispatch_and_suppression_are_traced() {
    let w = Watchable::new(0);
    w.add_change_listener(Callback::new(|_| {}), ListenerOptions::new().once());

    let ((), messages) = capture(|| {
        w.set_value(1);
        w.set_value(1);
    });

    assert!(saw(&messages, tracing::Level::TRACE, "watchable.dispatch"));
    assert!(saw(&messages, tracing::Level::TRACE, "watchable.once_consumed"));
    assert!(saw(&messages, tracing::Level::TRACE, "watchable.suppressed"));
}

#[test]
fn when_logs_immediate_and_deferred_outcomes() {
    let w = Watchable::new(json!({"ready": false}));

    let (outcome, messages) = capture(|| {
        w.when_path_equals("ready", false, Callback::new(|_| {}))?;
        w.when_path_equals("ready", true, Callback::new(|_| {}))
    });

    assert!(outcome.is_ok());
    assert!(saw(&messages, tracing::Level::DEBUG, "watchable.when_immediate"));
    assert!(saw(&messages, tracing::Level::DEBUG, "watchable.when_deferred"));
}

#[test]
fn rejected_array_write_warns() {
    let list = watchable::Container::array();
    let w = Watchable::new(list.clone());

    let ((), messages) = capture(|| list.set("name", "x"));

    assert!(saw(&messages, tracing::Level::WARN, "watchable.array_write_rejected"));
    assert!(list.is_empty());
    assert_eq!(w.version(), 0);
}
