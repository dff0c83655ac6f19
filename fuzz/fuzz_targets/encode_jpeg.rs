#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use image::{DynamicImage, RgbaImage};
use libfuzzer_sys::fuzz_target;
use picture_press::engine::encode_jpeg;

#[derive(Arbitrary, Debug)]
struct SurfaceSeed {
    width: u8,
    height: u8,
    quality: u8,
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let seed = match SurfaceSeed::arbitrary(&mut unstructured) {
        Ok(seed) => seed,
        Err(_) => return,
    };
    let pixels = unstructured.take_rest();

    let width = seed.width as u32 % 64;
    let height = seed.height as u32 % 64;
    let mut buffer = vec![0u8; (width * height * 4) as usize];
    if !pixels.is_empty() {
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = pixels[i % pixels.len()];
        }
    }
    let Some(rgba) = RgbaImage::from_raw(width, height, buffer) else {
        return;
    };

    // zero-area surfaces must fail cleanly, everything else must encode
    match encode_jpeg(&DynamicImage::ImageRgba8(rgba), seed.quality) {
        Ok(bytes) => assert_eq!(&bytes[0..2], &[0xFF, 0xD8]),
        Err(_) => assert!(width == 0 || height == 0),
    }
});
