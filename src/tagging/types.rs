use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaggingError {
    #[error("Tagging request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Tagging API error: {status} {body}")]
    Api { status: u16, body: String },
    #[error("Tagging model returned no text")]
    EmptyResponse,
}

#[async_trait]
pub trait Tagger: Send + Sync {
    fn model(&self) -> &str;
    /// Raw model output describing the image; cleaning happens in the caller.
    async fn describe(&self, image: &[u8], mime_type: &str) -> Result<String, TaggingError>;
}
