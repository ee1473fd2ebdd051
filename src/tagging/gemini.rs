use super::types::{Tagger, TaggingError};
use crate::config::Secret;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, info};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const KEYWORD_PROMPT: &str = "Analyze this image and provide exactly 10 keywords for online shopping.
Include both factual objects (e.g., Mountain, River) and emotional atmosphere (e.g., Serene, Majestic).

CRITICAL RULE:
- Output ONLY the keywords separated by commas.
- Do NOT write 'Product Description', 'Keywords:', or any introduction.
- Do NOT use bullet points or numbering.

Format example: Mount Fuji, Sunset, Peaceful, Red, Nature, Dreamy, Art, Landscape, Calm, Beautiful";

pub struct GeminiTagger {
    client: reqwest::Client,
    base_url: String,
    api_key: Secret,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiTagger {
    pub fn new(api_key: Secret, model: &str) -> Self {
        Self::with_base_url(api_key, model, GEMINI_BASE_URL)
    }

    pub fn with_base_url(api_key: Secret, model: &str, base_url: &str) -> Self {
        info!("Gemini tagger initialized (model: {})", model);
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.trim_start_matches("models/").to_string(),
        }
    }
}

#[async_trait]
impl Tagger for GeminiTagger {
    fn model(&self) -> &str {
        &self.model
    }

    async fn describe(&self, image: &[u8], mime_type: &str) -> Result<String, TaggingError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": KEYWORD_PROMPT },
                    { "inline_data": { "mime_type": mime_type, "data": STANDARD.encode(image) } }
                ]
            }]
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose())])
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TaggingError::Api { status, body });
        }

        let data: GenerateResponse = resp.json().await?;
        let text: String = data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(TaggingError::EmptyResponse);
        }
        debug!("Gemini raw description: {}", text);
        Ok(text)
    }
}
