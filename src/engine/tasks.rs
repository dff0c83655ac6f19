// src/engine/tasks.rs
//
// The compression task: decode -> resize -> encode, implemented once.
// The dispatcher only decides which thread calls `run`.

use crate::config::ExecutionMode;
use crate::engine::decoder::{decode_image, detect_exif_orientation};
use crate::engine::encoder::encode_jpeg;
use crate::engine::guard::RequestGuard;
use crate::engine::pipeline::{apply_orientation, calc_bounded_dimensions, resize_to};
use crate::error::CompressionError;
use crate::ops::{CompressionRequest, OutputFormat};
use crate::{CompressedImage, CompressionMetrics, CompressionResult};
use image::ImageFormat;
use std::time::Instant;

fn format_to_string(fmt: ImageFormat) -> String {
    match fmt {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        other => other.to_mime_type(),
    }
    .to_string()
}

fn millis_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Measures decode -> resize -> encode in milliseconds and fills sizes in one place.
struct MetricsRecorder {
    metrics: CompressionMetrics,
    stage_start: Instant,
}

impl MetricsRecorder {
    fn new(mode: ExecutionMode, input_size: usize) -> Self {
        let now = Instant::now();
        Self {
            metrics: CompressionMetrics::started(mode, input_size as u64, now),
            stage_start: now,
        }
    }

    fn started_at(&self) -> Instant {
        self.metrics.started_at
    }

    fn mark_decode_done(&mut self, format: ImageFormat, source_dims: (u32, u32)) {
        self.metrics.decode_ms = millis_since(self.stage_start);
        self.metrics.format_in = Some(format_to_string(format));
        self.metrics.source_dims = source_dims;
        self.stage_start = Instant::now();
    }

    fn mark_resize_done(&mut self, output_dims: (u32, u32)) {
        self.metrics.resize_ms = millis_since(self.stage_start);
        self.metrics.output_dims = output_dims;
        self.stage_start = Instant::now();
    }

    fn finalize(mut self, output_len: usize) -> CompressionMetrics {
        let m = &mut self.metrics;
        m.encode_ms = millis_since(self.stage_start);
        m.finished_at = Instant::now();
        m.total_ms = m.finished_at.duration_since(m.started_at).as_secs_f64() * 1000.0;
        m.bytes_out = output_len as u64;
        m.compression_ratio = if m.bytes_in > 0 {
            m.bytes_out as f64 / m.bytes_in as f64
        } else {
            0.0
        };
        self.metrics
    }
}

/// One accepted request, ready to execute on whichever thread the dispatcher picked.
pub struct CompressTask {
    pub request: CompressionRequest,
    pub guard: RequestGuard,
    pub mode: ExecutionMode,
    pub sequence: u64,
}

impl CompressTask {
    /// Run the whole pipeline, consuming the request.
    pub fn run(self) -> CompressionResult {
        let CompressTask {
            request,
            guard,
            mode,
            sequence,
        } = self;
        let CompressionRequest {
            raw_bytes,
            mime_type,
            max_width,
            max_height,
            quality,
        } = request;
        let format = OutputFormat::jpeg_from_unit_quality(quality);
        let mut recorder = MetricsRecorder::new(mode, raw_bytes.len());
        let started_at = recorder.started_at();

        // 1. Decode
        let (img, detected) = decode_image(&raw_bytes, &mime_type)?;
        // upright before bounding, the output carries no EXIF
        let img = match detect_exif_orientation(&raw_bytes) {
            Some(orientation) if orientation != 1 => {
                tracing::debug!(sequence, orientation, "applying exif orientation");
                apply_orientation(img, orientation)
            }
            _ => img,
        };
        // the encoded input is no longer needed once pixels exist
        drop(raw_bytes);
        let source_dims = (img.width(), img.height());
        guard.enforce_deadline(started_at, "decode")?;
        recorder.mark_decode_done(detected, source_dims);
        tracing::debug!(
            sequence,
            width = source_dims.0,
            height = source_dims.1,
            format = ?detected,
            "decoded"
        );

        // 2. Resize into the bounding box
        let (target_w, target_h) =
            calc_bounded_dimensions(source_dims.0, source_dims.1, max_width, max_height);
        let resized = resize_to(img, target_w, target_h)?;
        guard.enforce_deadline(started_at, "resize")?;
        recorder.mark_resize_done((target_w, target_h));
        tracing::debug!(sequence, target_w, target_h, "resized");

        // 3. Encode
        let bytes = match format {
            OutputFormat::Jpeg { quality } => encode_jpeg(&resized, quality)?,
        };
        guard.enforce_deadline(started_at, "encode")?;
        drop(resized);

        let metrics = recorder.finalize(bytes.len());
        tracing::debug!(sequence, bytes_out = bytes.len(), "encoded");

        Ok(CompressedImage {
            bytes,
            mime_type: format.mime_type(),
            width: target_w,
            height: target_h,
            metrics,
        })
    }
}

/// Run a request on the current thread without a dispatcher.
pub fn compress(request: CompressionRequest) -> Result<CompressedImage, CompressionError> {
    let guard = RequestGuard::default();
    guard.validate(&request)?;
    CompressTask {
        request,
        guard,
        mode: ExecutionMode::Inline,
        sequence: 0,
    }
    .run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use image::{DynamicImage, GenericImageView, ImageBuffer, Rgba, RgbImage};
    use std::time::Duration;

    fn sample_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn sample_jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        encode_jpeg(&img, 90).unwrap()
    }

    fn task(request: CompressionRequest) -> CompressTask {
        CompressTask {
            request,
            guard: RequestGuard::default(),
            mode: ExecutionMode::Inline,
            sequence: 1,
        }
    }

    #[test]
    fn run_outputs_bounded_jpeg() {
        let request = CompressionRequest::new(sample_jpeg_bytes(1600, 1200), "image/jpeg");
        let out = task(request).run().expect("compression should succeed");
        assert_eq!((out.width, out.height), (800, 600));
        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!(&out.bytes[0..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (800, 600));
    }

    #[test]
    fn run_keeps_small_png_dimensions() {
        let request = CompressionRequest::new(sample_png_bytes(40, 30), "image/png");
        let out = task(request).run().unwrap();
        assert_eq!((out.width, out.height), (40, 30));
        assert_eq!(out.metrics.format_in.as_deref(), Some("png"));
        assert_eq!(out.metrics.source_dims, (40, 30));
        assert_eq!(out.metrics.output_dims, (40, 30));
    }

    #[test]
    fn run_fills_metrics() {
        let bytes = sample_png_bytes(64, 64);
        let input_len = bytes.len() as u64;
        let out = task(CompressionRequest::new(bytes, "image/png").with_bounds(32, 32))
            .run()
            .unwrap();
        let m = &out.metrics;
        assert_eq!(m.bytes_in, input_len);
        assert_eq!(m.bytes_out, out.bytes.len() as u64);
        assert!(m.compression_ratio > 0.0);
        assert!(m.total_ms >= m.decode_ms);
        assert!(m.finished_at >= m.started_at);
        assert_eq!(m.mode, ExecutionMode::Inline);
    }

    fn with_exif_orientation(jpeg: &[u8], orientation: u8) -> Vec<u8> {
        let mut payload = b"Exif\0\0MM\0\x2A\0\0\0\x08".to_vec();
        payload.extend_from_slice(&[0x00, 0x01, 0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        payload.extend_from_slice(&[0x00, orientation, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let len = (payload.len() + 2) as u16;
        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn run_uprights_rotated_jpeg_before_bounding() {
        let jpeg = with_exif_orientation(&sample_jpeg_bytes(1600, 1200), 6);
        let out = task(CompressionRequest::new(jpeg, "image/jpeg")).run().unwrap();
        assert_eq!((out.width, out.height), (600, 800));
        assert_eq!(out.metrics.source_dims, (1200, 1600));
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (600, 800));
    }

    #[test]
    fn corrupt_input_is_decode_error() {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xDB];
        data.extend(std::iter::repeat(0u8).take(128));
        let err = task(CompressionRequest::new(data, "image/jpeg"))
            .run()
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::DecodeError);
    }

    #[test]
    fn zero_timeout_fails_as_worker_error() {
        let mut t = task(CompressionRequest::new(sample_png_bytes(16, 16), "image/png"));
        t.guard.timeout = Some(Duration::ZERO);
        let err = t.run().unwrap_err();
        assert!(matches!(err, CompressionError::Timeout { .. }));
    }

    #[test]
    fn compress_validates_first() {
        let err = compress(CompressionRequest::new(vec![1, 2, 3], "image/png").with_quality(0.0))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ValidationError);
    }
}
