// src/ops.rs
//
// Compression request and output format.
// These are cheap to create and move - the expensive work happens on the worker.

/// Default bounding box used for profile pictures.
pub const DEFAULT_MAX_WIDTH: u32 = 800;
pub const DEFAULT_MAX_HEIGHT: u32 = 800;
/// Default re-encode quality, in (0, 1].
pub const DEFAULT_QUALITY: f32 = 0.8;

/// Mime types accepted at submission.
pub const ACCEPTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

/// A single compression job.
///
/// Immutable once submitted: the dispatcher takes it by value, so the raw
/// bytes move into the pipeline instead of being shared with the caller.
#[derive(Clone, Debug)]
pub struct CompressionRequest {
    pub raw_bytes: Vec<u8>,
    pub mime_type: String,
    pub max_width: u32,
    pub max_height: u32,
    pub quality: f32,
}

impl CompressionRequest {
    /// Create a request with the profile-picture defaults (800x800, quality 0.8).
    pub fn new(raw_bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            raw_bytes,
            mime_type: mime_type.into(),
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            quality: DEFAULT_QUALITY,
        }
    }

    pub fn with_bounds(mut self, max_width: u32, max_height: u32) -> Self {
        self.max_width = max_width;
        self.max_height = max_height;
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    /// Input size in bytes.
    pub fn len(&self) -> usize {
        self.raw_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_bytes.is_empty()
    }
}

/// Whether a declared mime type is one the pipeline accepts.
pub fn is_accepted_mime_type(mime_type: &str) -> bool {
    let normalized = mime_type.trim().to_ascii_lowercase();
    ACCEPTED_MIME_TYPES.contains(&normalized.as_str())
}

/// Output format for encoding.
///
/// The pipeline always re-encodes to JPEG; the quality is stored on the
/// mozjpeg 1-100 scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
}

impl OutputFormat {
    /// Map a (0, 1] quality onto the encoder scale.
    pub fn jpeg_from_unit_quality(quality: f32) -> Self {
        let scaled = (quality * 100.0).round();
        let clamped = if scaled.is_finite() {
            scaled.clamp(1.0, 100.0) as u8
        } else {
            1
        };
        Self::Jpeg { quality: clamped }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "image/jpeg",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpeg",
        }
    }
}
