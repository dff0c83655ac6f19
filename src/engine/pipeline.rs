// src/engine/pipeline.rs
//
// Resizer: bounded target dimensions and SIMD resampling.

use crate::engine::common::{run_with_panic_policy, Stage};
use crate::error::CompressionError;
use fast_image_resize::{self as fir, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }

    pub fn into_compression_error(self) -> CompressionError {
        CompressionError::resize_failed(self.source_dims, self.target_dims, self.reason)
    }
}

/// Calculate the output size for a bounding box (never upscales).
///
/// When the source exceeds the box on at least one axis it is scaled by
/// `min(max_w / w, max_h / h)`, rounded to the nearest integer and clamped to
/// `[1, max]` per axis. Otherwise the source size is returned unchanged.
pub fn calc_bounded_dimensions(
    orig_w: u32,
    orig_h: u32,
    max_w: u32,
    max_h: u32,
) -> (u32, u32) {
    if orig_w <= max_w && orig_h <= max_h {
        return (orig_w, orig_h);
    }
    if orig_w == 0 || orig_h == 0 {
        return (orig_w.min(max_w), orig_h.min(max_h));
    }

    let ratio = (max_w as f64 / orig_w as f64).min(max_h as f64 / orig_h as f64);
    let scale = |side: u32, max: u32| -> u32 {
        let scaled = (side as f64 * ratio).round() as u32;
        scaled.clamp(1, max.max(1))
    };
    (scale(orig_w, max_w), scale(orig_h, max_h))
}

/// Rotate/flip a decoded image upright according to its EXIF Orientation (1-8).
pub fn apply_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(), // transpose
        6 => img.rotate90(),
        7 => img.rotate270().fliph(), // transverse
        8 => img.rotate270(),
        _ => img,
    }
}

/// Resize an owned image to the given size. Same-size requests pass through.
pub fn resize_to(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, CompressionError> {
    if (img.width(), img.height()) == (dst_width, dst_height) {
        return Ok(img);
    }
    let source_dims = (img.width(), img.height());
    run_with_panic_policy("resize:fir", Stage::Resize, move || {
        fast_resize_owned(img, dst_width, dst_height)
            .map_err(ResizeError::into_compression_error)
    })
    .map_err(|err| match err {
        // panics lose the geometry; put it back
        CompressionError::ResizeFailed {
            source_width: 0,
            message,
            ..
        } => CompressionError::resize_failed(source_dims, (dst_width, dst_height), message),
        other => other,
    })
}

/// Pixel layouts handed to fast_image_resize. Other color types are widened first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Rgb,
    Rgba,
}

impl Layout {
    fn pixel_type(self) -> PixelType {
        match self {
            Layout::Rgb => PixelType::U8x3,
            Layout::Rgba => PixelType::U8x4,
        }
    }

    fn wrap(self, width: u32, height: u32, pixels: Vec<u8>) -> Result<DynamicImage, String> {
        match self {
            Layout::Rgb => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
            Layout::Rgba => {
                RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
            }
        }
        .ok_or_else(|| format!("pixel buffer does not match {width}x{height} {self:?}"))
    }
}

/// Resample an owned image with Lanczos3, reusing its pixel buffer for RGB/RGBA.
///
/// Falls back to `image::imageops` when fast_image_resize rejects the input.
pub fn fast_resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, ResizeError> {
    let src = (img.width(), img.height());
    let dst = (dst_width, dst_height);
    if src.0 == 0 || src.1 == 0 || dst.0 == 0 || dst.1 == 0 {
        return Err(ResizeError::new(src, dst, "invalid dimensions for resize"));
    }

    let (layout, mut pixels) = match img {
        DynamicImage::ImageRgb8(rgb) => (Layout::Rgb, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (Layout::Rgba, rgba.into_raw()),
        other if other.color().has_alpha() => (Layout::Rgba, other.to_rgba8().into_raw()),
        other => (Layout::Rgb, other.to_rgb8().into_raw()),
    };

    match fir_resize(src, dst, layout, &mut pixels) {
        Ok(out) => Ok(out),
        Err(err) => {
            tracing::debug!(%err, "fir resize failed, falling back to image crate");
            imageops_resize(src, dst, layout, pixels)
                .map_err(|fallback| ResizeError::new(src, dst, format!("{err}; fallback: {fallback}")))
        }
    }
}

fn fir_resize(
    src: (u32, u32),
    dst: (u32, u32),
    layout: Layout,
    pixels: &mut [u8],
) -> Result<DynamicImage, String> {
    let pixel_type = layout.pixel_type();
    let mut src_image = fir::images::Image::from_slice_u8(src.0, src.1, pixels, pixel_type)
        .map_err(|e| format!("fir source image error: {e:?}"))?;
    let mut dst_image = fir::images::Image::new(dst.0, dst.1, pixel_type);

    // alpha is premultiplied around the convolution to avoid dark fringes
    let mul_div = MulDiv::default();
    let premultiply = layout == Layout::Rgba;
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let options =
        ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    layout.wrap(dst.0, dst.1, dst_image.into_vec())
}

fn imageops_resize(
    src: (u32, u32),
    dst: (u32, u32),
    layout: Layout,
    pixels: Vec<u8>,
) -> Result<DynamicImage, String> {
    let img = layout.wrap(src.0, src.1, pixels)?;
    Ok(img.resize_exact(dst.0, dst.1, FilterType::Lanczos3))
}
