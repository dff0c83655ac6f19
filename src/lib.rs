// lib.rs
//
// picture-press: profile-picture normalization off the caller's thread
//
// Raw user-selected bytes go in, a bounded JPEG comes out:
// - Decode JPEG/PNG by content
// - Shrink into a bounding box, never upscale
// - Re-encode as progressive JPEG at a chosen quality
// - Run on a dedicated worker thread, or inline when none is available

pub mod config;
pub mod engine;
pub mod error;
pub mod ops;
pub mod upload;

use std::time::Instant;

pub use config::{DispatcherConfig, ExecutionMode};
pub use engine::{CompressionTicket, Dispatcher, DispatcherState};
pub use error::{CompressionError, ErrorCategory};
pub use ops::CompressionRequest;
pub use upload::{PictureStore, ProfilePictureUploader, StoreError, UploadError};

/// Outcome of one compression request. Exactly one side is populated.
pub type CompressionResult = std::result::Result<CompressedImage, CompressionError>;

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Mime types accepted at submission
pub fn supported_input_formats() -> Vec<String> {
    ops::ACCEPTED_MIME_TYPES
        .iter()
        .map(|m| m.to_string())
        .collect()
}

/// Metrics payload version. Bump when fields change meaning.
pub const COMPRESSION_METRICS_VERSION: &str = "1.0.0";

/// Per-request measurements, filled in by the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct CompressionMetrics {
    /// Schema version for compatibility negotiation
    pub version: &'static str,
    /// Decode stage duration in milliseconds
    pub decode_ms: f64,
    /// Resize stage duration in milliseconds
    pub resize_ms: f64,
    /// Encode stage duration in milliseconds
    pub encode_ms: f64,
    /// Total wall-clock duration in milliseconds
    pub total_ms: f64,
    /// Input size in bytes
    pub bytes_in: u64,
    /// Output size in bytes
    pub bytes_out: u64,
    /// Compression ratio (bytes_out / bytes_in)
    pub compression_ratio: f64,
    pub source_dims: (u32, u32),
    pub output_dims: (u32, u32),
    /// Detected input format (lowercase: jpeg, png)
    pub format_in: Option<String>,
    /// Execution context the request ran in
    pub mode: ExecutionMode,
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl CompressionMetrics {
    pub(crate) fn started(mode: ExecutionMode, bytes_in: u64, now: Instant) -> Self {
        Self {
            version: COMPRESSION_METRICS_VERSION,
            decode_ms: 0.0,
            resize_ms: 0.0,
            encode_ms: 0.0,
            total_ms: 0.0,
            bytes_in,
            bytes_out: 0,
            compression_ratio: 0.0,
            source_dims: (0, 0),
            output_dims: (0, 0),
            format_in: None,
            mode,
            started_at: now,
            finished_at: now,
        }
    }
}

/// A successfully normalized picture.
#[derive(Clone, Debug)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    /// Always `image/jpeg`
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub metrics: CompressionMetrics,
}

impl CompressedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hand over the encoded bytes without copying.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
