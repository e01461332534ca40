use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    config::ChatConfig,
    errors::{DescriberError, Result},
    providers::TextImprover,
};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible `/chat/completions` client with fixed sampling parameters.
///
/// Each call is a single attempt; failures surface as [`DescriberError::GenerationFailed`].
#[derive(Clone)]
pub struct OpenAiChatClient {
    http_client: HttpClient,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u64,
    temperature: f64,
}

impl OpenAiChatClient {
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .user_agent("ListingDescriber/0.1")
            .timeout(Duration::from_secs(120))
            .build()?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/');

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: format!("{base_url}/chat/completions"),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl TextImprover for OpenAiChatClient {
    async fn improve(&self, prompt: &str) -> Result<String> {
        let payload = ChatRequest {
            model: &self.model,
            messages: [ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DescriberError::generation(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DescriberError::generation(format!(
                "chat completion failed ({}): {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| DescriberError::generation(format!("failed to parse response: {}", e)))?;

        chat_response
            .extract_text()
            .ok_or_else(|| DescriberError::generation("chat completion returned no text"))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatRequestMessage<'a>; 1],
    max_tokens: u64,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn extract_text(&self) -> Option<String> {
        self.choices
            .iter()
            .find_map(|choice| choice.message.as_ref()?.content.as_ref()?.extract_text())
    }
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<ChatMessageContent>,
}

// Some compatible gateways return content as an array of typed segments.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChatMessageContent {
    Text(String),
    Segments(Vec<ChatMessageSegment>),
}

impl ChatMessageContent {
    fn extract_text(&self) -> Option<String> {
        let text = match self {
            ChatMessageContent::Text(text) => text.clone(),
            ChatMessageContent::Segments(segments) => segments
                .iter()
                .filter_map(|segment| segment.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        };

        if text.trim().is_empty() { None } else { Some(text) }
    }
}

#[derive(Deserialize)]
struct ChatMessageSegment {
    #[serde(default)]
    text: Option<String>,
}
