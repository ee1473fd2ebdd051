use crate::answer::{ChatResponse, ImagePolicy, shape_answer};
use crate::config::DifyConfig;
use crate::dify::{DifyClient, RelayError};
use tracing::{info, warn};

const EMPTY_QUERY_ANSWER: &str = "Please describe the image you are looking for.";

/// Turns a user query into a browser-ready answer. Never fails: upstream
/// and transport problems come back as answer text.
#[derive(Clone)]
pub struct ChatRelay {
    dify: DifyClient,
    policy: ImagePolicy,
    marker: String,
}

impl ChatRelay {
    pub fn new(dify: DifyClient, config: &DifyConfig) -> Self {
        Self {
            dify,
            policy: config.image_policy,
            marker: config.payment_marker.clone(),
        }
    }

    pub fn client(&self) -> &DifyClient {
        &self.dify
    }

    pub async fn answer(&self, query: &str) -> ChatResponse {
        if query.trim().is_empty() {
            return ChatResponse::text(EMPTY_QUERY_ANSWER);
        }

        info!(
            "Relaying query ({} chars, {:?} mode)",
            query.chars().count(),
            self.dify.mode()
        );

        match self.dify.ask(query).await {
            Ok(answer) => shape_answer(&answer, self.policy, &self.marker),
            Err(e) => {
                warn!("Chat relay failed: {}", e);
                ChatResponse::text(error_answer(&e))
            }
        }
    }
}

pub fn error_answer(err: &RelayError) -> String {
    match err {
        RelayError::Upstream { status, .. } => format!("API error: {}", status),
        other => format!("Server error: {}", other),
    }
}
