#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::Path;
use teslacrack::{Category, FileClassifier};

fuzz_target!(|data: &[u8]| {
    let classifier = FileClassifier::default();
    let c = classifier.classify_bytes(Path::new("sample.pdf.vvv"), data);
    assert_ne!(c.category, Category::Plain);
    assert_eq!(c.header.is_some(), matches!(c.category, Category::Tesla | Category::Crypted));
});
