// src/error.rs
//
// Unified error handling for picture-press
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - ValidationError: Bad request shape, caught before any work starts
// - DecodeError: Unreadable or unsupported image bytes
// - EncodeError: Resampling / re-encoding failures
// - WorkerError: The execution context itself failed, vanished or timed out

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy delivered with every failed compression.
///
/// The category is the tag of the failure result; the `Display` text of the
/// error is its reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Bad request shape, recoverable by re-prompting the user
    ValidationError,
    /// Unreadable or unsupported image bytes
    DecodeError,
    /// Re-encoding failure (degenerate geometry, codec failure)
    EncodeError,
    /// The background execution context failed, crashed or timed out
    WorkerError,
}

impl ErrorCategory {
    /// Get string representation of error category
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ValidationError => "ValidationError",
            ErrorCategory::DecodeError => "DecodeError",
            ErrorCategory::EncodeError => "EncodeError",
            ErrorCategory::WorkerError => "WorkerError",
        }
    }

    /// Get the PICTURE_PRESS_* error code string for this category
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::ValidationError => "PICTURE_PRESS_VALIDATION_ERROR",
            ErrorCategory::DecodeError => "PICTURE_PRESS_DECODE_ERROR",
            ErrorCategory::EncodeError => "PICTURE_PRESS_ENCODE_ERROR",
            ErrorCategory::WorkerError => "PICTURE_PRESS_WORKER_ERROR",
        }
    }
}

/// picture-press error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompressionError {
    // Validation Errors
    #[error("Input image is empty")]
    EmptyInput,

    #[error("Unsupported mime type '{mime_type}'. Expected image/jpeg or image/png")]
    UnsupportedMimeType { mime_type: Cow<'static, str> },

    #[error("Invalid bounding box: max_width={max_width}, max_height={max_height}")]
    InvalidBounds { max_width: u32, max_height: u32 },

    #[error("Invalid quality {quality}. Expected a value in (0, 1]")]
    InvalidQuality { quality: f32 },

    #[error("Input size {size} bytes exceeds limit of {limit} bytes")]
    InputTooLarge { size: u64, limit: u64 },

    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Encode Errors
    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Worker Errors
    #[error("Worker crashed: {message}")]
    WorkerCrashed { message: Cow<'static, str> },

    #[error("Worker unavailable: {message}")]
    WorkerUnavailable { message: Cow<'static, str> },

    #[error("Compression exceeded {limit_ms}ms timeout at {stage} stage (elapsed: {elapsed_ms}ms)")]
    Timeout {
        stage: &'static str,
        limit_ms: u64,
        elapsed_ms: u64,
    },
}

// Constructor Helpers
impl CompressionError {
    pub fn empty_input() -> Self {
        Self::EmptyInput
    }

    pub fn unsupported_mime_type(mime_type: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedMimeType {
            mime_type: mime_type.into(),
        }
    }

    pub fn invalid_bounds(max_width: u32, max_height: u32) -> Self {
        Self::InvalidBounds {
            max_width,
            max_height,
        }
    }

    pub fn invalid_quality(quality: f32) -> Self {
        Self::InvalidQuality { quality }
    }

    pub fn input_too_large(size: u64, limit: u64) -> Self {
        Self::InputTooLarge { size, limit }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn worker_crashed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::WorkerCrashed {
            message: message.into(),
        }
    }

    pub fn worker_unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::WorkerUnavailable {
            message: message.into(),
        }
    }

    pub fn timeout(stage: &'static str, limit_ms: u64, elapsed_ms: u64) -> Self {
        Self::Timeout {
            stage,
            limit_ms,
            elapsed_ms,
        }
    }

    /// Check if this error is recoverable (user can fix it by re-prompting)
    pub fn is_recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::ValidationError)
    }

    /// Human-readable failure reason delivered to the caller.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyInput
            | Self::UnsupportedMimeType { .. }
            | Self::InvalidBounds { .. }
            | Self::InvalidQuality { .. }
            | Self::InputTooLarge { .. } => ErrorCategory::ValidationError,

            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorCategory::DecodeError,

            // Resampling happens between decode and encode; a failure there means
            // no surface can be produced for the encoder, so it shares its tag.
            Self::ResizeFailed { .. } | Self::EncodeFailed { .. } => ErrorCategory::EncodeError,

            Self::WorkerCrashed { .. } | Self::WorkerUnavailable { .. } | Self::Timeout { .. } => {
                ErrorCategory::WorkerError
            }
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, CompressionError>;
