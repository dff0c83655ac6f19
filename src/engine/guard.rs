// src/engine/guard.rs
//
// Request validation and per-stage deadline enforcement.

use crate::config::DispatcherConfig;
use crate::error::CompressionError;
use crate::ops::{is_accepted_mime_type, CompressionRequest};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default)]
pub struct RequestGuard {
    pub max_input_bytes: Option<u64>,
    pub timeout: Option<Duration>,
}

impl RequestGuard {
    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self {
            max_input_bytes: config.max_input_bytes,
            timeout: config.timeout,
        }
    }

    /// Validate a request before it is queued. Nothing runs when this fails.
    pub fn validate(&self, request: &CompressionRequest) -> Result<(), CompressionError> {
        if request.raw_bytes.is_empty() {
            return Err(CompressionError::empty_input());
        }
        if !is_accepted_mime_type(&request.mime_type) {
            return Err(CompressionError::unsupported_mime_type(
                request.mime_type.clone(),
            ));
        }
        if request.max_width == 0 || request.max_height == 0 {
            return Err(CompressionError::invalid_bounds(
                request.max_width,
                request.max_height,
            ));
        }
        let q = request.quality;
        if !q.is_finite() || q <= 0.0 || q > 1.0 {
            return Err(CompressionError::invalid_quality(q));
        }
        self.enforce_source_len(request.raw_bytes.len())
    }

    pub fn enforce_source_len(&self, len: usize) -> Result<(), CompressionError> {
        if let Some(limit) = self.max_input_bytes {
            let len_u64 = len as u64;
            if len_u64 > limit {
                return Err(CompressionError::input_too_large(len_u64, limit));
            }
        }
        Ok(())
    }

    /// Fail once the configured deadline has passed. Called between stages;
    /// a stage in progress is never interrupted.
    pub fn enforce_deadline(
        &self,
        started_at: Instant,
        stage: &'static str,
    ) -> Result<(), CompressionError> {
        if let Some(limit) = self.timeout {
            let elapsed = started_at.elapsed();
            if elapsed > limit {
                return Err(CompressionError::timeout(
                    stage,
                    limit.as_millis() as u64,
                    elapsed.as_millis() as u64,
                ));
            }
        }
        Ok(())
    }
}
