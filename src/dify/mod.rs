mod stream;

use crate::config::{DifyConfig, Secret};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use stream::StreamAssembler;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Upstream returned HTTP {status}")]
    Upstream { status: u16, body: String },
    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed upstream response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Blocking,
    #[default]
    Streaming,
}

#[derive(Debug, Serialize)]
pub struct ChatPayload<'a> {
    pub inputs: serde_json::Map<String, serde_json::Value>,
    pub query: &'a str,
    pub response_mode: ResponseMode,
    pub user: &'a str,
}

#[derive(Deserialize)]
struct BlockingResponse {
    #[serde(default)]
    answer: String,
}

#[derive(Clone)]
pub struct DifyClient {
    client: reqwest::Client,
    url: String,
    api_key: Secret,
    user: String,
    mode: ResponseMode,
}

impl DifyClient {
    pub fn new(config: &DifyConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &DifyConfig) -> Self {
        info!(
            "Dify client initialized (url: {}, mode: {:?})",
            config.url, config.response_mode
        );
        Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            user: config.user.clone(),
            mode: config.response_mode,
        }
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    fn payload<'a>(&'a self, query: &'a str, mode: ResponseMode) -> ChatPayload<'a> {
        ChatPayload {
            inputs: serde_json::Map::new(),
            query,
            response_mode: mode,
            user: &self.user,
        }
    }

    async fn send(&self, query: &str, mode: ResponseMode) -> Result<reqwest::Response, RelayError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose())
            .json(&self.payload(query, mode))
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Upstream { status, body });
        }
        Ok(resp)
    }

    /// Sends `query` and returns the full answer text.
    pub async fn ask(&self, query: &str) -> Result<String, RelayError> {
        let resp = self.send(query, self.mode).await?;

        match self.mode {
            ResponseMode::Blocking => {
                let body = resp.text().await?;
                let data: BlockingResponse = serde_json::from_str(&body)?;
                Ok(data.answer)
            }
            ResponseMode::Streaming => {
                let mut assembler = StreamAssembler::new();
                let mut body = resp.bytes_stream();
                while let Some(chunk) = body.next().await {
                    assembler.push(&chunk?)?;
                }
                let answer = assembler.finish()?;
                debug!("Streamed answer: {} chars", answer.chars().count());
                Ok(answer)
            }
        }
    }

    /// Opens a streaming request and hands back the untouched upstream response.
    pub async fn open_stream(&self, query: &str) -> Result<reqwest::Response, RelayError> {
        self.send(query, ResponseMode::Streaming).await
    }
}
