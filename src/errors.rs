use thiserror::Error;

pub type Result<T> = std::result::Result<T, DescriberError>;

#[derive(Debug, Error)]
pub enum DescriberError {
    #[error("invalid base64 image payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to store image: {0}")]
    StorageWriteFailed(String),

    #[error("failed to generate description: {0}")]
    GenerationFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Other(String),
}

impl DescriberError {
    pub fn storage(cause: impl Into<String>) -> Self {
        Self::StorageWriteFailed(cause.into())
    }

    pub fn generation(cause: impl Into<String>) -> Self {
        Self::GenerationFailed(cause.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<anyhow::Error> for DescriberError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
