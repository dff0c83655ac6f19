use image::{DynamicImage, GenericImageView, RgbImage};
use picture_press::engine::{calc_bounded_dimensions, compress};
use picture_press::ops::CompressionRequest;
use proptest::prelude::*;

fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_output_fits_bounds(
        orig_w in 1u32..=10_000,
        orig_h in 1u32..=10_000,
        max_w in 1u32..=4_000,
        max_h in 1u32..=4_000,
    ) {
        let (w, h) = calc_bounded_dimensions(orig_w, orig_h, max_w, max_h);
        prop_assert!(w >= 1 && h >= 1);
        prop_assert!(w <= max_w && h <= max_h);
        prop_assert!(w <= orig_w && h <= orig_h);
    }

    #[test]
    fn prop_within_bounds_is_unchanged(
        (max_w, orig_w) in (1u32..=4_000).prop_flat_map(|m| (Just(m), 1u32..=m)),
        (max_h, orig_h) in (1u32..=4_000).prop_flat_map(|m| (Just(m), 1u32..=m)),
    ) {
        prop_assert_eq!(
            calc_bounded_dimensions(orig_w, orig_h, max_w, max_h),
            (orig_w, orig_h)
        );
    }

    #[test]
    fn prop_single_axis_overflow_pins_that_axis(
        max_w in 1u32..=2_000,
        max_h in 1u32..=2_000,
        extra in 1u32..=8_000,
        other_frac in 0.0f64..=1.0,
    ) {
        // width exceeds, height fits
        let orig_w = max_w + extra;
        let orig_h = ((max_h as f64 * other_frac).round() as u32).max(1);
        let (w, h) = calc_bounded_dimensions(orig_w, orig_h, max_w, max_h);
        prop_assert_eq!(w, max_w);
        let expected_h = orig_h as f64 * max_w as f64 / orig_w as f64;
        prop_assert!((h as f64 - expected_h.max(1.0)).abs() <= 1.0);

        // mirrored: height exceeds, width fits
        let (w2, h2) = calc_bounded_dimensions(orig_h, orig_w, max_h, max_w);
        prop_assert_eq!(h2, max_w);
        prop_assert_eq!(w2, h);
    }

    #[test]
    fn prop_aspect_ratio_preserved(
        orig_w in 2u32..=10_000,
        orig_h in 2u32..=10_000,
        max_w in 2u32..=2_000,
        max_h in 2u32..=2_000,
    ) {
        let ratio = (max_w as f64 / orig_w as f64).min(max_h as f64 / orig_h as f64);
        // below one pixel the clamp to 1 dominates the ratio
        prop_assume!(orig_w as f64 * ratio >= 1.0 && orig_h as f64 * ratio >= 1.0);

        let (w, h) = calc_bounded_dimensions(orig_w, orig_h, max_w, max_h);
        // each axis is off by at most half a pixel
        let skew = (w as f64 * orig_h as f64 - h as f64 * orig_w as f64).abs();
        prop_assert!(skew <= 0.5 * (orig_w as f64 + orig_h as f64) + 1e-6);
    }

    #[test]
    fn prop_bounding_is_idempotent(
        orig_w in 1u32..=10_000,
        orig_h in 1u32..=10_000,
        max_w in 1u32..=4_000,
        max_h in 1u32..=4_000,
    ) {
        let once = calc_bounded_dimensions(orig_w, orig_h, max_w, max_h);
        let twice = calc_bounded_dimensions(once.0, once.1, max_w, max_h);
        prop_assert_eq!(once, twice);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 16,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_pipeline_output_matches_calc(
        orig_w in 1u32..=96,
        orig_h in 1u32..=96,
        max_w in 1u32..=64,
        max_h in 1u32..=64,
        quality in 0.05f32..=1.0,
    ) {
        let request = CompressionRequest::new(create_test_png(orig_w, orig_h), "image/png")
            .with_bounds(max_w, max_h)
            .with_quality(quality);
        let out = compress(request).unwrap();
        let expected = calc_bounded_dimensions(orig_w, orig_h, max_w, max_h);
        prop_assert_eq!((out.width, out.height), expected);

        let decoded = image::load_from_memory(&out.bytes).unwrap();
        prop_assert_eq!(decoded.dimensions(), expected);
    }
}
