// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the panic policy applied around codec calls.

use crate::error::CompressionError;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Pipeline stage a codec call belongs to. Decides how a caught panic is tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Resize,
    Encode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Resize => "resize",
            Stage::Encode => "encode",
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run a codec call, converting a panic into a stage-tagged error.
///
/// Codec crates wrap C libraries and malformed input can still unwind out of
/// them; the caller must always get a failure value instead of a crashed worker.
pub fn run_with_panic_policy<T, F>(
    label: &'static str,
    stage: Stage,
    f: F,
) -> std::result::Result<T, CompressionError>
where
    F: FnOnce() -> std::result::Result<T, CompressionError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = format!("{label}: panic: {}", panic_message(payload.as_ref()));
            tracing::warn!(label, stage = stage.as_str(), %message, "codec panicked");
            Err(match stage {
                Stage::Decode => CompressionError::decode_failed(message),
                Stage::Resize => CompressionError::resize_failed((0, 0), (0, 0), message),
                Stage::Encode => CompressionError::encode_failed("jpeg", message),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn passes_through_ok_and_err() {
        let ok: Result<u8, _> = run_with_panic_policy("t", Stage::Decode, || Ok(7));
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u8, _> = run_with_panic_policy("t", Stage::Decode, || {
            Err(CompressionError::decode_failed("nope"))
        });
        assert_eq!(err.unwrap_err(), CompressionError::decode_failed("nope"));
    }

    #[test]
    fn panic_is_tagged_by_stage() {
        let decode: Result<(), _> =
            run_with_panic_policy("decode:test", Stage::Decode, || panic!("bad header"));
        let err = decode.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::DecodeError);
        assert!(err.to_string().contains("bad header"));

        let encode: Result<(), _> =
            run_with_panic_policy("encode:test", Stage::Encode, || panic!("{}", 42));
        assert_eq!(encode.unwrap_err().category(), ErrorCategory::EncodeError);
    }
}
