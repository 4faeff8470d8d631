#![no_main]

use std::cell::Cell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use watchable::{Callback, Container, ListenerOptions, Value, Watchable};

#[derive(Arbitrary, Debug)]
enum Op {
    SetRoot(i8),
    SetKey { key: u8, value: i8 },
    AttachObject { key: u8 },
    AttachArray { key: u8 },
    Push(i8),
    Pop,
    SetLength(u8),
    Remove { key: u8 },
    Link { from: u8, to: u8 },
}

fn key(k: u8) -> String {
    format!("k{}", k % 8)
}

fuzz_target!(|ops: Vec<Op>| {
    let w = Watchable::new(Container::object());
    let hits = Rc::new(Cell::new(0u64));
    let counter = Rc::clone(&hits);
    w.add_change_listener(
        Callback::new(move |_| counter.set(counter.get() + 1)),
        ListenerOptions::new(),
    );

    let containers = [Container::object(), Container::array()];
    for op in ops.into_iter().take(256) {
        let root = match w.value() {
            Value::Container(c) => c,
            _ => Container::object(),
        };
        let list = &containers[1];
        match op {
            Op::SetRoot(n) => w.set_value(n),
            Op::SetKey { key: k, value } => root.set(key(k), value),
            Op::AttachObject { key: k } => root.set(key(k), containers[0].clone()),
            Op::AttachArray { key: k } => root.set(key(k), list.clone()),
            Op::Push(n) => {
                list.push(n);
            }
            Op::Pop => {
                list.pop();
            }
            Op::SetLength(n) => list.set("length", n % 16),
            Op::Remove { key: k } => {
                root.remove(&key(k));
            }
            Op::Link { from, to } => {
                let (a, b) = (from as usize % 2, to as usize % 2);
                containers[a].set(key(from), containers[b].clone());
            }
        }
    }

    // Every dispatched change reached the one persistent listener.
    assert_eq!(hits.get(), w.version());
    // Snapshots terminate even when the graph has cycles.
    let _ = w.value().to_json();
    w.clear_listeners();
});
