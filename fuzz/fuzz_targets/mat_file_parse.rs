//! Fuzz target for MAT file decoding and HICO-DET conversion.

#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use simpledataset::dataset::io_hicodet_mat::{from_hicodet_slice, HicoDetSplit};
use simpledataset::dataset::mat5::MatFile;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    if MatFile::parse(data).is_ok() {
        let _ = from_hicodet_slice(data, Path::new("."), HicoDetSplit::Train);
    }
});
