#![no_main]

use libfuzzer_sys::fuzz_target;
use teslacrack::{CipherHeader, HEADER_LEN};

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = CipherHeader::parse(data) {
        assert!(data.len() >= HEADER_LEN);
        let again = CipherHeader::parse(&header.to_bytes()).unwrap();
        assert_eq!(again.key_id(), header.key_id());
        assert_eq!(again.original_size(), header.original_size());
    }
});
