#![no_main]

use libfuzzer_sys::fuzz_target;
use picture_press::engine::decode_image;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // Errors are expected for garbage input; only panics or memory issues matter.
    for declared in ["image/jpeg", "image/png"] {
        if let Ok((img, _format)) = decode_image(data, declared) {
            assert!(img.width() > 0 && img.height() > 0);
        }
    }
});
