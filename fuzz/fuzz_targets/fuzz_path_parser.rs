#![no_main]

use libfuzzer_sys::fuzz_target;
use watchable::PropertyPath;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(path) = PropertyPath::parse(text) else {
        return;
    };
    // Canonical text must reparse to the same keys.
    let canonical =
        PropertyPath::from_keys(path.keys().to_vec()).expect("parsed paths are non-empty");
    let reparsed = PropertyPath::parse(canonical.as_str()).expect("canonical text parses");
    assert_eq!(reparsed.keys(), path.keys());
});
