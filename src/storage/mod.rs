mod gcs;

pub use gcs::GcsObjectStore;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

use crate::errors::Result;

pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Location of an uploaded photo, readable by the captioning backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    uri: String,
}

impl StoredImage {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl fmt::Display for StoredImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Durable blob store for listing photos. Uploads are not retried.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn store(&self, image: Bytes) -> Result<StoredImage>;
}
