#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use picture_press::engine::{calc_bounded_dimensions, compress};
use picture_press::CompressionRequest;

#[derive(Arbitrary, Debug)]
struct RequestSeed {
    max_width: u16,
    max_height: u16,
    quality: f32,
    declared_png: bool,
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let seed = match RequestSeed::arbitrary(&mut unstructured) {
        Ok(seed) => seed,
        Err(_) => return,
    };
    let raw_bytes = unstructured.take_rest().to_vec();
    let mime_type = if seed.declared_png { "image/png" } else { "image/jpeg" };

    let request = CompressionRequest::new(raw_bytes, mime_type)
        .with_bounds(seed.max_width as u32 % 1024, seed.max_height as u32 % 1024)
        .with_quality(seed.quality);

    let (max_w, max_h) = (request.max_width, request.max_height);
    if let Ok(out) = compress(request) {
        let (w, h) = (out.metrics.source_dims.0, out.metrics.source_dims.1);
        assert_eq!((out.width, out.height), calc_bounded_dimensions(w, h, max_w, max_h));
        assert!(out.width <= max_w && out.height <= max_h);
    }
});
