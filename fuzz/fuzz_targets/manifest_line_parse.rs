//! Fuzz target for classification manifest lines.
//!
//! This fuzzer feeds arbitrary UTF-8 lines to the manifest line splitter and
//! the class id list decoder, checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use simpledataset::dataset::codec::fuzz_parse_manifest_line;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_parse_manifest_line(line);
});
