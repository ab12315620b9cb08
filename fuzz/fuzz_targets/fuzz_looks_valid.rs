#![no_main]

use libfuzzer_sys::fuzz_target;
use teslacrack::cipher::looks_valid;

fuzz_target!(|data: &[u8]| {
    let (hint, prefix) = match data.split_first() {
        Some((&selector, rest)) => (["pdf", "docx", "txt", "jpg", "bin"].get(selector as usize % 6).copied(), rest),
        None => (None, data),
    };
    let _ = looks_valid(prefix, hint);
});
