use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::{
    config::StorageConfig,
    errors::{DescriberError, Result},
    storage::{IMAGE_CONTENT_TYPE, ObjectStore, StoredImage},
    util::image_object_key,
};

/// Google Cloud Storage client using the JSON API simple media upload.
pub struct GcsObjectStore {
    client: reqwest::Client,
    bucket: String,
    upload_base_url: String,
    access_token: Option<String>,
}

impl GcsObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("ListingDescriber/0.1")
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            upload_base_url: config.upload_base_url.clone(),
            access_token: config.access_token.clone(),
        })
    }

    async fn upload(&self, key: &str, image: Bytes) -> Result<()> {
        let url = format!("{}/b/{}/o", self.upload_base_url, self.bucket);

        let mut builder = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", key)])
            .header(CONTENT_TYPE, IMAGE_CONTENT_TYPE)
            .body(image);

        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| DescriberError::storage(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DescriberError::storage(format!(
                "upload of {key} returned {status}: {body}"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn store(&self, image: Bytes) -> Result<StoredImage> {
        let key = image_object_key();
        let size = image.len();

        self.upload(&key, image).await?;

        let stored = StoredImage::new(format!("gs://{}/{}", self.bucket, key));
        debug!(target: "storage", uri = %stored, bytes = size, "image uploaded");
        Ok(stored)
    }
}
