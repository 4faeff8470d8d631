//! Property-based invariant tests for change dispatch.
//!
//! 1. Listeners run in order of their most recent registration.
//! 2. Every listener sees every distinct change exactly once.
//! 3. Re-writing the current value never notifies and never bumps `version`.
//! 4. `version` equals the number of writes that changed a slot.
//! 5. A `once` listener fires at most once, whatever the write sequence.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::json;
use watchable::{Callback, Condition, ListenerOptions, Value, Watchable};

// ── Strategies ──────────────────────────────────────────────────────────

/// Small integer domain so repeated (suppressed) writes are common.
fn writes() -> impl Strategy<Value = Vec<i32>> {
    proptest::collection::vec(0i32..4, 0..40)
}

/// Registration sequence over a handful of listener ids; repeats re-register.
fn registrations() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(0usize..6, 1..20)
}

/// Expected order: each id at the position of its last registration.
fn most_recent_order(ids: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = Vec::new();
    for &id in ids {
        order.retain(|&seen| seen != id);
        order.push(id);
    }
    order
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Ordering and delivery
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn dispatch_order_is_most_recent_registration(ids in registrations()) {
        let w = Watchable::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let callbacks: Vec<Callback> = (0..6)
            .map(|id| {
                let log = Rc::clone(&log);
                Callback::new(move |_| log.borrow_mut().push(id))
            })
            .collect();

        for &id in &ids {
            w.add_change_listener(callbacks[id].clone(), ListenerOptions::new());
        }
        w.set_value(1);

        let expected = most_recent_order(&ids);
        prop_assert_eq!(w.listener_count(), expected.len());
        prop_assert_eq!(&*log.borrow(), &expected);
    }

    #[test]
    fn every_listener_sees_every_change(seq in writes(), listeners in 1usize..5) {
        let w = Watchable::new(json!({"n": 0}));
        let counters: Vec<Rc<Cell<u64>>> = (0..listeners).map(|_| Rc::new(Cell::new(0))).collect();
        for counter in &counters {
            let counter = Rc::clone(counter);
            w.add_change_listener(
                Callback::new(move |_| counter.set(counter.get() + 1)),
                ListenerOptions::new(),
            );
        }

        let root = w.value();
        let root = root.as_container().expect("object");
        for &n in &seq {
            root.set("n", n);
        }

        for counter in &counters {
            prop_assert_eq!(counter.get(), w.version());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3-4. Suppression and version accounting
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn version_counts_distinct_writes(seq in writes()) {
        let w = Watchable::new(0);
        let mut current = 0;
        let mut expected = 0u64;
        for &n in &seq {
            if n != current {
                expected += 1;
                current = n;
            }
            w.set_value(n);
        }
        prop_assert_eq!(w.version(), expected);
        prop_assert_eq!(w.value(), Value::from(current));
    }

    #[test]
    fn rewriting_current_value_is_silent(start in 0i32..100, repeats in 1usize..10) {
        let w = Watchable::new(json!({"items": [start]}));
        let hits = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&hits);
        w.add_change_listener(
            Callback::new(move |_| counter.set(counter.get() + 1)),
            ListenerOptions::new(),
        );

        let items = w.value().as_container().expect("object").get("items");
        let items = items.as_container().expect("array");
        for _ in 0..repeats {
            w.set_value(w.value());
            items.set_at(0, start);
            items.set("length", 1);
        }

        prop_assert_eq!(hits.get(), 0);
        prop_assert_eq!(w.version(), 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Once listeners
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn once_listener_fires_at_most_once(seq in writes(), threshold in 0i32..4) {
        let w = Watchable::new(-1);
        let hits = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&hits);
        w.add_change_listener(
            Callback::new(move |_| counter.set(counter.get() + 1)),
            ListenerOptions::new().once().condition(Condition::new(move |e| {
                e.new_value.as_f64().is_some_and(|n| n >= f64::from(threshold))
            })),
        );

        for &n in &seq {
            w.set_value(n);
        }

        let should_fire = seq.iter().any(|&n| n >= threshold);
        prop_assert_eq!(hits.get(), u32::from(should_fire));
        prop_assert_eq!(w.listener_count(), usize::from(!should_fire));
    }
}
