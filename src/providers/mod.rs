pub mod openai;
pub mod vertex;

use async_trait::async_trait;
use thiserror::Error;

use crate::{errors::Result, storage::StoredImage};

/// How a captioning failure should be treated by the caller's retry policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptionError {
    /// Quota or resource exhaustion on the backend.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Fatal(String),
}

impl CaptionError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CaptionError::RateLimited(_))
    }
}

/// Vision-language backend producing a caption for a stored photo.
#[async_trait]
pub trait ImageCaptioner: Send + Sync {
    async fn describe(
        &self,
        image: &StoredImage,
        instruction: &str,
    ) -> std::result::Result<String, CaptionError>;
}

/// Chat-completion backend that writes the final listing text.
#[async_trait]
pub trait TextImprover: Send + Sync {
    async fn improve(&self, prompt: &str) -> Result<String>;
}
