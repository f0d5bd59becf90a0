#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(once) = mosaicu::reencode_png_u8(data) {
        assert_eq!(mosaicu::reencode_png_u8(&once).unwrap(), once);
    }
});
