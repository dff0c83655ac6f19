// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg) and PNG (zune-png).

use crate::engine::common::{run_with_panic_policy, Stage};
use crate::error::CompressionError;
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};

// Always use CompressionError so decode failures keep their DecodeError tag.
type DecoderResult<T> = std::result::Result<T, CompressionError>;

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", Stage::Decode, || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(CompressionError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            CompressionError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            CompressionError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width();
        let height = decompress.height();

        if width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize {
            return Err(CompressionError::dimension_exceeds_limit(
                width.max(height).min(u32::MAX as usize) as u32,
                MAX_DIMENSION,
            ));
        }
        let width_u32 = width as u32;
        let height_u32 = height as u32;
        check_dimensions(width_u32, height_u32)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            CompressionError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;

        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image =
            RgbImage::from_raw(width_u32, height_u32, flat_pixels).ok_or_else(|| {
                CompressionError::decode_failed("mozjpeg: failed to create image from raw data")
            })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:png", Stage::Decode, || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(data, options);

        decoder
            .decode_headers()
            .map_err(|e| CompressionError::decode_failed(format!("png: bad header: {e}")))?;
        let info = decoder
            .get_info()
            .ok_or_else(|| CompressionError::decode_failed("png: missing header info"))?;
        let width = info.width as u32;
        let height = info.height as u32;
        check_dimensions(width, height)?;

        let pixels = decoder
            .decode()
            .map_err(|e| CompressionError::decode_failed(format!("png: decode failed: {e}")))?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(CompressionError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .get_colorspace()
            .ok_or_else(|| CompressionError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| CompressionError::decode_failed("png: failed to build RGB image"))?,
            ColorSpace::RGBA => RgbaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| {
                    CompressionError::decode_failed("png: failed to build RGBA image")
                })?,
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| {
                    CompressionError::decode_failed("png: failed to build Luma image")
                })?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| {
                    CompressionError::decode_failed("png: failed to build LumaA image")
                })?,
            other => {
                return Err(CompressionError::decode_failed(format!(
                    "png: unsupported colorspace {:?}",
                    other
                )))
            }
        };

        Ok(img)
    })
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Map a declared mime type onto the format it names.
fn declared_format(mime_type: &str) -> Option<ImageFormat> {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        _ => None,
    }
}

/// Unified decode entrypoint:
/// - Detect format once (magic bytes); the content wins over the declared mime type
/// - Route JPEG to mozjpeg and PNG to zune-png
/// - Reject everything else
pub fn decode_image(bytes: &[u8], declared_mime: &str) -> DecoderResult<(DynamicImage, ImageFormat)> {
    if bytes.is_empty() {
        return Err(CompressionError::decode_failed("no image data"));
    }

    let detected = detect_format(bytes);
    let declared = declared_format(declared_mime);
    if detected.is_some() && declared.is_some() && detected != declared {
        tracing::debug!(
            declared = declared_mime,
            detected = ?detected,
            "declared mime type disagrees with image content, decoding by content"
        );
    }

    ensure_dimensions_safe(bytes)?;

    match detected {
        Some(ImageFormat::Jpeg) => Ok((decode_jpeg_mozjpeg(bytes)?, ImageFormat::Jpeg)),
        Some(ImageFormat::Png) => Ok((decode_png_zune(bytes)?, ImageFormat::Png)),
        Some(other) => Err(CompressionError::unsupported_format(
            other.to_mime_type().to_string(),
        )),
        None => Err(CompressionError::decode_failed(format!(
            "bytes are not a recognizable image (declared {declared_mime})"
        ))),
    }
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(CompressionError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(CompressionError::pixel_count_exceeds_limit(
            pixels, MAX_PIXELS,
        ));
    }
    Ok(())
}

/// Extract EXIF Orientation tag (1-8). Returns None if missing or invalid.
pub fn detect_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    // stored as Short or Long depending on the writer
    let orientation = field.value.get_uint(0)? as u16;
    (1..=8).contains(&orientation).then_some(orientation)
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> DecoderResult<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}
