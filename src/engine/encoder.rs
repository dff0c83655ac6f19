// src/engine/encoder.rs
//
// Encoder operations: JPEG via mozjpeg with web-oriented settings

use crate::engine::common::{run_with_panic_policy, Stage};
use crate::error::CompressionError;
use image::{DynamicImage, RgbImage};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;

use crate::engine::MAX_DIMENSION;

// Always use CompressionError so encode failures keep their EncodeError tag.
type EncoderResult<T> = std::result::Result<T, CompressionError>;

/// Encode to JPEG using mozjpeg with optimized coding.
///
/// `quality` is on the mozjpeg 1-100 scale.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", Stage::Encode, || {
        let quality = quality.clamp(1, 100);

        let rgb = flatten_to_rgb(img);
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(CompressionError::encode_failed(
                "jpeg",
                format!("cannot encode zero-area surface {w}x{h}"),
            ));
        }

        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(CompressionError::encode_failed(
                "jpeg",
                format!("surface {w}x{h} exceeds maximum dimension {MAX_DIMENSION}"),
            ));
        }

        let expected_len = (w as usize) * (h as usize) * 3;
        if pixels.len() != expected_len {
            return Err(CompressionError::encode_failed(
                "jpeg",
                format!(
                    "pixel buffer mismatch: expected {expected_len} bytes, got {}",
                    pixels.len()
                ),
            ));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);

        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);

        // scan optimization resets the quant tables, so quality goes last
        let quality_f32 = quality as f32;
        comp.set_quality(quality_f32);

        let smoothing = if quality_f32 >= 90.0 {
            0
        } else if quality_f32 >= 70.0 {
            5
        } else if quality_f32 >= 60.0 {
            10
        } else {
            18
        };
        comp.set_smoothing_factor(smoothing);

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                CompressionError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    CompressionError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                CompressionError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }

        if output.is_empty() {
            return Err(CompressionError::encode_failed(
                "jpeg",
                "mozjpeg produced no output",
            ));
        }

        Ok(output)
    })
}

/// Convert any surface to RGB8 the way a canvas JPEG export does: alpha is
/// composited onto black.
fn flatten_to_rgb(img: &DynamicImage) -> Cow<'_, RgbImage> {
    match img {
        DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
        other if other.color().has_alpha() => {
            let rgba = other.to_rgba8();
            let (w, h) = rgba.dimensions();
            let flattened = RgbImage::from_fn(w, h, |x, y| {
                let [r, g, b, a] = rgba.get_pixel(x, y).0;
                let scale = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
                image::Rgb([scale(r), scale(g), scale(b)])
            });
            Cow::Owned(flattened)
        }
        other => Cow::Owned(other.to_rgb8()),
    }
}
