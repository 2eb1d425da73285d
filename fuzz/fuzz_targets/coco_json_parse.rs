//! Fuzz target for COCO JSON import.
//!
//! Run with: `cargo +nightly fuzz run coco_json_parse`

#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use simpledataset::dataset::io_coco_json::from_coco_slice;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = from_coco_slice(data, Path::new("."));
});
