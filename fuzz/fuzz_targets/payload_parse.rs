//! Fuzz target for detection and relationship payload files.

#![no_main]

use libfuzzer_sys::fuzz_target;
use simpledataset::dataset::codec::decode_payload;
use simpledataset::dataset::{BoxLabel, RelationLabel};

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let text = String::from_utf8_lossy(data);
    let _ = decode_payload::<BoxLabel>(&text);
    let _ = decode_payload::<RelationLabel>(&text);
});
