use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Deserializer};
use tracing::{debug, error, info};

use crate::{
    captioning::ImageDescriber,
    errors::Result,
    prompt::{AttributeValue, ImageCaption, ListingAttributes, compose_prompt},
    providers::TextImprover,
    storage::ObjectStore,
};

/// Body of `POST /improve-description`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rooms: Option<AttributeValue>,
    #[serde(default)]
    pub kitchen_area: Option<AttributeValue>,
    #[serde(default)]
    pub house_area: Option<AttributeValue>,
    #[serde(default)]
    pub floors: Option<AttributeValue>,
    #[serde(default)]
    pub property_type: Option<AttributeValue>,
    /// Base64-encoded JPEG photos, in display order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<String>,
}

impl ListingRequest {
    pub fn attributes(&self) -> ListingAttributes {
        ListingAttributes {
            rooms: self.rooms.clone(),
            kitchen_area: self.kitchen_area.clone(),
            house_area: self.house_area.clone(),
            floors: self.floors.clone(),
            property_type: self.property_type.clone(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decodes a base64 photo, tolerating a `data:<mime>;base64,` prefix and line breaks.
pub fn decode_image(encoded: &str) -> Result<Bytes> {
    let payload = match encoded.trim_start().strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
        None => encoded,
    };

    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    Ok(Bytes::from(BASE64_STANDARD.decode(compact)?))
}

/// Runs one listing through upload, captioning, prompt composition and copywriting.
#[derive(Clone)]
pub struct ListingDescriber {
    store: Arc<dyn ObjectStore>,
    describer: ImageDescriber,
    improver: Arc<dyn TextImprover>,
}

impl ListingDescriber {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        describer: ImageDescriber,
        improver: Arc<dyn TextImprover>,
    ) -> Self {
        Self {
            store,
            describer,
            improver,
        }
    }

    /// Photos are handled one after another in request order. A photo that
    /// cannot be decoded or stored is logged and skipped; only a failure of
    /// the final text generation is returned as an error.
    pub async fn improve_description(&self, request: &ListingRequest) -> Result<String> {
        info!(
            target: "pipeline",
            images = request.images.len(),
            has_description = request.description.as_deref().is_some_and(|d| !d.is_empty()),
            "processing listing"
        );

        let captions = self.caption_images(&request.images).await;

        let prompt = compose_prompt(
            request.description.as_deref(),
            &captions,
            &request.attributes(),
        );
        debug!(target: "pipeline", %prompt, "composed prompt");

        let improved = self.improver.improve(&prompt).await.inspect_err(|err| {
            error!(target: "generation", error = %err, "description generation failed");
        })?;

        info!(
            target: "pipeline",
            captions = captions.len(),
            chars = improved.len(),
            "description generated"
        );
        Ok(improved)
    }

    async fn caption_images(&self, images: &[String]) -> Vec<ImageCaption> {
        let mut captions = Vec::with_capacity(images.len());

        for (position, encoded) in images.iter().enumerate() {
            let index = position + 1;
            match self.caption_image(encoded).await {
                Ok(text) if text.is_empty() => {
                    debug!(target: "pipeline", image = index, "empty caption skipped");
                }
                Ok(text) => captions.push(ImageCaption { index, text }),
                Err(err) => {
                    error!(target: "pipeline", image = index, error = %err, "error processing image");
                }
            }
        }

        captions
    }

    async fn caption_image(&self, encoded: &str) -> Result<String> {
        let image = decode_image(encoded)?;
        let stored = self.store.store(image).await?;
        Ok(self.describer.caption(&stored).await)
    }
}
