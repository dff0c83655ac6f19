// src/engine.rs
//
// The core of picture-press. A three-stage pipeline that:
// 1. Decodes JPEG/PNG by content
// 2. Shrinks into a bounding box without upscaling
// 3. Re-encodes as JPEG with mozjpeg
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod common;
mod decoder;
mod dispatcher;
mod encoder;
mod guard;
mod pipeline;
mod pool;
mod tasks;

pub use common::Stage;
pub use decoder::{check_dimensions, decode_image, detect_format};
pub use dispatcher::{CompressionTicket, Dispatcher, DispatcherState};
pub use encoder::encode_jpeg;
pub use guard::RequestGuard;
pub use pipeline::{calc_bounded_dimensions, resize_to, ResizeError};
pub use tasks::{compress, CompressTask};
