use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    config::VisionConfig,
    errors::Result,
    providers::{CaptionError, ImageCaptioner},
    storage::{IMAGE_CONTENT_TYPE, StoredImage},
};

const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// Gemini on Vertex AI, reading photos straight from Cloud Storage via `fileData`.
#[derive(Clone)]
pub struct VertexCaptioner {
    http_client: HttpClient,
    endpoint: String,
    access_token: Option<String>,
}

impl VertexCaptioner {
    pub fn from_config(config: &VisionConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .user_agent("ListingDescriber/0.1")
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            access_token: config.access_token.clone(),
        })
    }
}

#[async_trait]
impl ImageCaptioner for VertexCaptioner {
    async fn describe(
        &self,
        image: &StoredImage,
        instruction: &str,
    ) -> std::result::Result<String, CaptionError> {
        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::FileData {
                        file_data: FileData {
                            mime_type: IMAGE_CONTENT_TYPE,
                            file_uri: image.uri(),
                        },
                    },
                    Part::Text { text: instruction },
                ],
            }],
        };

        let mut builder = self.http_client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CaptionError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CaptionError::Fatal(format!("failed to parse Gemini response: {e}")))?;

        body.extract_text()
            .ok_or_else(|| CaptionError::Fatal("Gemini returned no caption text".to_string()))
    }
}

fn classify_failure(status: StatusCode, body: &str) -> CaptionError {
    let api_status = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.status);
    let message = format!("Gemini request failed ({status}): {body}");

    if status == StatusCode::TOO_MANY_REQUESTS || api_status.as_deref() == Some(RESOURCE_EXHAUSTED)
    {
        CaptionError::RateLimited(message)
    } else if status.is_server_error() {
        CaptionError::Transient(message)
    } else {
        CaptionError::Fatal(message)
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn extract_text(&self) -> Option<String> {
        let text = self
            .candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() { None } else { Some(text) }
    }
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
}
