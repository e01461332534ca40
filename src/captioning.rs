use std::{sync::Arc, time::Duration};

use tracing::{error, warn};

use crate::{config::VisionConfig, providers::ImageCaptioner, storage::StoredImage};

/// Returned in place of a caption once captioning has permanently failed.
///
/// It is caption-shaped on purpose: the prompt composer treats every photo as
/// "some text", so this sentence can end up in the composed prompt.
pub const CAPTION_FAILURE_SENTINEL: &str =
    "Error: Could not generate image description due to repeated quota errors.";

pub const CAPTION_INSTRUCTION: &str = "Describe the photo in text format. The text should be complete, concise, and to the point. Output only the description without any additional comments!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl From<&VisionConfig> for RetryPolicy {
    fn from(config: &VisionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff,
        }
    }
}

/// Captions stored photos, backing off exponentially while the backend reports quota exhaustion.
#[derive(Clone)]
pub struct ImageDescriber {
    captioner: Arc<dyn ImageCaptioner>,
    policy: RetryPolicy,
}

impl ImageDescriber {
    pub fn new(captioner: Arc<dyn ImageCaptioner>, policy: RetryPolicy) -> Self {
        Self { captioner, policy }
    }

    /// Never fails: a non-retryable error or an exhausted retry budget yields
    /// [`CAPTION_FAILURE_SENTINEL`]. Dropping the future cancels any pending backoff.
    pub async fn caption(&self, image: &StoredImage) -> String {
        let max_attempts = self.policy.max_attempts;
        let mut backoff = self.policy.initial_backoff;

        for attempt in 1..=max_attempts {
            match self.captioner.describe(image, CAPTION_INSTRUCTION).await {
                Ok(caption) => return caption,
                Err(err) if err.is_rate_limited() => {
                    warn!(
                        target: "caption",
                        uri = %image,
                        attempt,
                        max_attempts,
                        backoff_secs = backoff.as_secs_f64(),
                        error = %err,
                        "quota exceeded, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => {
                    error!(target: "caption", uri = %image, attempt, error = %err, "captioning failed");
                    break;
                }
            }
        }

        error!(target: "caption", uri = %image, "no caption produced, using failure text");
        CAPTION_FAILURE_SENTINEL.to_string()
    }
}
