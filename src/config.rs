use std::{
    env, fs,
    net::SocketAddr,
    path::Path,
    time::Duration,
};

use anyhow::{Context, anyhow};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config/app_config.toml";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_BUCKET: &str = "dubadu_ai_photo";
const DEFAULT_GCS_UPLOAD_URL: &str = "https://storage.googleapis.com/upload/storage/v1";
const DEFAULT_VERTEX_LOCATION: &str = "us-central1";
const DEFAULT_VISION_MODEL: &str = "gemini-1.5-flash-002";
const DEFAULT_CAPTION_ATTEMPTS: u32 = 5;
const DEFAULT_CAPTION_BACKOFF_MS: u64 = 1000;
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_CHAT_MAX_TOKENS: u64 = 800;
const DEFAULT_CHAT_TEMPERATURE: f64 = 0.7;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,
    pub request_timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub bucket: String,
    pub upload_base_url: String,
    pub access_token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct VisionConfig {
    pub project_id: String,
    pub location: String,
    pub model: String,
    /// Full `generateContent` URL; derived from project, location and model when unset.
    pub endpoint: String,
    pub access_token: Option<String>,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u64,
    pub temperature: f64,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub vision: VisionConfig,
    pub chat: ChatConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let explicit_path = env::var("APP_CONFIG_PATH").ok();
        let config_path = explicit_path
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let config_path = Path::new(&config_path);

        let file_config = if config_path.exists() {
            let contents = fs::read_to_string(config_path)
                .with_context(|| format!("failed to read config file {:?}", config_path))?;
            Self::parse(&contents)
                .with_context(|| format!("failed to parse config file {:?}", config_path))?
        } else if explicit_path.is_some() {
            return Err(anyhow!("config file {:?} does not exist", config_path));
        } else {
            tracing::warn!(
                target: "config",
                path = ?config_path,
                "config file not found, using defaults and environment"
            );
            FileConfig::default()
        };

        file_config.into_domain()
    }

    fn parse(contents: &str) -> anyhow::Result<FileConfig> {
        Ok(toml::from_str(contents)?)
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: Option<FileServerConfig>,
    #[serde(default)]
    storage: Option<FileStorageConfig>,
    #[serde(default)]
    vision: Option<FileVisionConfig>,
    #[serde(default)]
    chat: Option<FileChatConfig>,
}

impl FileConfig {
    fn into_domain(self) -> anyhow::Result<AppConfig> {
        let google_token = env::var("GOOGLE_ACCESS_TOKEN").ok();

        Ok(AppConfig {
            server: self.server.unwrap_or_default().into_domain()?,
            storage: self
                .storage
                .unwrap_or_default()
                .into_domain(google_token.clone()),
            vision: self.vision.unwrap_or_default().into_domain(google_token)?,
            chat: self.chat.unwrap_or_default().into_domain()?,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileServerConfig {
    #[serde(default)]
    bind_addr: Option<String>,
    #[serde(default)]
    max_body_bytes: Option<usize>,
    #[serde(default)]
    request_timeout_seconds: Option<u64>,
}

impl FileServerConfig {
    fn into_domain(self) -> anyhow::Result<ServerConfig> {
        let bind_addr_str = self
            .bind_addr
            .or_else(|| env::var("BIND_ADDR").ok())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .with_context(|| format!("failed to parse server.bind_addr: {}", bind_addr_str))?;

        Ok(ServerConfig {
            bind_addr,
            max_body_bytes: self.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
            request_timeout: self
                .request_timeout_seconds
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileStorageConfig {
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    upload_base_url: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl FileStorageConfig {
    fn into_domain(self, google_token: Option<String>) -> StorageConfig {
        StorageConfig {
            bucket: self
                .bucket
                .or_else(|| env::var("GCS_BUCKET").ok())
                .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            upload_base_url: self
                .upload_base_url
                .unwrap_or_else(|| DEFAULT_GCS_UPLOAD_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            access_token: self.access_token.or(google_token),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileVisionConfig {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default)]
    initial_backoff_ms: Option<u64>,
}

impl FileVisionConfig {
    fn into_domain(self, google_token: Option<String>) -> anyhow::Result<VisionConfig> {
        let project_id = self
            .project_id
            .or_else(|| env::var("GCP_PROJECT_ID").ok())
            .ok_or_else(|| anyhow!("vision.project_id is not configured (or set GCP_PROJECT_ID)"))?;
        let location = self
            .location
            .unwrap_or_else(|| DEFAULT_VERTEX_LOCATION.to_string());
        let model = self
            .model
            .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string());
        let endpoint = self
            .endpoint
            .unwrap_or_else(|| vertex_generate_url(&project_id, &location, &model));

        Ok(VisionConfig {
            project_id,
            location,
            model,
            endpoint,
            access_token: self.access_token.or(google_token),
            max_attempts: self
                .max_attempts
                .unwrap_or(DEFAULT_CAPTION_ATTEMPTS)
                .max(1),
            initial_backoff: Duration::from_millis(
                self.initial_backoff_ms
                    .unwrap_or(DEFAULT_CAPTION_BACKOFF_MS),
            ),
        })
    }
}

fn vertex_generate_url(project_id: &str, location: &str, model: &str) -> String {
    format!(
        "https://{location}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{location}/publishers/google/models/{model}:generateContent"
    )
}

#[derive(Debug, Deserialize, Default)]
struct FileChatConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u64>,
    #[serde(default)]
    temperature: Option<f64>,
}

impl FileChatConfig {
    fn into_domain(self) -> anyhow::Result<ChatConfig> {
        let api_key = self
            .api_key
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| anyhow!("chat.api_key is not configured (or set OPENAI_API_KEY)"))?;

        Ok(ChatConfig {
            api_key,
            base_url: self.base_url.or_else(|| env::var("OPENAI_BASE_URL").ok()),
            model: self.model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_CHAT_MAX_TOKENS),
            temperature: self.temperature.unwrap_or(DEFAULT_CHAT_TEMPERATURE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_sections_override_defaults() {
        let file = AppConfig::parse(
            r#"
            [server]
            bind_addr = "0.0.0.0:8080"
            request_timeout_seconds = 120

            [storage]
            bucket = "listing-photos"
            upload_base_url = "http://localhost:4443/upload/storage/v1/"

            [vision]
            project_id = "demo-project"
            location = "europe-west4"
            max_attempts = 3
            initial_backoff_ms = 250

            [chat]
            api_key = "sk-test"
            model = "gpt-4o-mini"
            temperature = 0.2
            "#,
        )
        .unwrap();

        let config = file.into_domain().unwrap();

        assert_eq!(config.server.bind_addr.port(), 8080);
        assert_eq!(config.server.request_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.storage.bucket, "listing-photos");
        assert_eq!(
            config.storage.upload_base_url,
            "http://localhost:4443/upload/storage/v1"
        );
        assert_eq!(config.vision.max_attempts, 3);
        assert_eq!(config.vision.initial_backoff, Duration::from_millis(250));
        assert_eq!(
            config.vision.endpoint,
            "https://europe-west4-aiplatform.googleapis.com/v1/projects/demo-project/locations/europe-west4/publishers/google/models/gemini-1.5-flash-002:generateContent"
        );
        assert_eq!(config.chat.model, "gpt-4o-mini");
        assert_eq!(config.chat.max_tokens, 800);
        assert_eq!(config.chat.temperature, 0.2);
    }

    #[test]
    fn minimal_sections_fall_back_to_defaults() {
        let file = AppConfig::parse(
            r#"
            [vision]
            project_id = "demo-project"

            [chat]
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        let config = file.into_domain().unwrap();

        assert_eq!(config.server.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.server.request_timeout, None);
        assert_eq!(config.vision.model, DEFAULT_VISION_MODEL);
        assert_eq!(config.vision.max_attempts, 5);
        assert_eq!(config.vision.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.chat.model, "gpt-3.5-turbo");
        assert_eq!(config.chat.temperature, 0.7);
    }

    #[test]
    fn invalid_bind_addr_is_rejected() {
        let file = AppConfig::parse(
            r#"
            [server]
            bind_addr = "not-an-address"

            [vision]
            project_id = "demo-project"

            [chat]
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        assert!(file.into_domain().is_err());
    }
}
