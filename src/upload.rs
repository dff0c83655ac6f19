// src/upload.rs
//
// Compress-then-store flow for profile pictures.
//
// Storage itself is out of scope: callers plug in a `PictureStore`. The
// uploader only builds the object key, runs the request through its
// dispatcher and hands the JPEG to the store.

use crate::engine::Dispatcher;
use crate::error::CompressionError;
use crate::ops::CompressionRequest;
use crate::CompressedImage;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Failure reported by a picture store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("store rejected {key}: {message}")]
pub struct StoreError {
    pub key: String,
    pub message: Cow<'static, str>,
}

impl StoreError {
    pub fn new(key: impl Into<String>, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum UploadError {
    #[error("no authenticated user")]
    NotAuthenticated,

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Blob storage that can hold a compressed picture and hand back its URL.
pub trait PictureStore {
    fn put(&self, key: &str, image: &CompressedImage) -> Result<String, StoreError>;
}

impl<S: PictureStore + ?Sized> PictureStore for Arc<S> {
    fn put(&self, key: &str, image: &CompressedImage) -> Result<String, StoreError> {
        (**self).put(key, image)
    }
}

/// Object key for a user's picture uploaded at `timestamp_ms`.
pub fn profile_picture_key(user_id: &str, timestamp_ms: u128) -> String {
    format!("profile-pictures/{user_id}/{timestamp_ms}.jpg")
}

fn now_millis() -> u128 {
    // a clock before the epoch only affects key uniqueness
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

pub struct ProfilePictureUploader<S> {
    dispatcher: Arc<Dispatcher>,
    store: S,
}

impl<S: PictureStore> ProfilePictureUploader<S> {
    pub fn new(dispatcher: Arc<Dispatcher>, store: S) -> Self {
        Self { dispatcher, store }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Compress `request` and store it under the user's picture prefix.
    /// Returns the URL reported by the store.
    pub fn upload(&self, user_id: &str, request: CompressionRequest) -> Result<String, UploadError> {
        self.upload_at(user_id, request, now_millis())
    }

    /// Same as [`upload`](Self::upload) with an explicit timestamp for the key.
    pub fn upload_at(
        &self,
        user_id: &str,
        request: CompressionRequest,
        timestamp_ms: u128,
    ) -> Result<String, UploadError> {
        if user_id.trim().is_empty() {
            return Err(UploadError::NotAuthenticated);
        }

        let image = self.dispatcher.submit(request)?.wait()?;
        let key = profile_picture_key(user_id, timestamp_ms);
        let url = self.store.put(&key, &image)?;
        tracing::info!(%key, bytes = image.len(), "profile picture stored");
        Ok(url)
    }
}
