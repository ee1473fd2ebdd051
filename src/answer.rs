use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://\S+(?:\.jpg|\.png|\.jpeg|\.gif|\.webp)").expect("image url pattern is valid")
});

/// How image references inside an answer reach the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePolicy {
    /// Pull the first http(s) image URL out into `image_url`.
    #[default]
    Url,
    /// Leave `![alt](url)` in the text; the page converts it.
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub image_url: Option<String>,
    pub show_payment: bool,
}

impl ChatResponse {
    pub fn text(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            image_url: None,
            show_payment: false,
        }
    }
}

pub fn extract_image_url(text: &str) -> Option<String> {
    IMAGE_URL.find(text).map(|m| m.as_str().to_string())
}

/// Removes every occurrence of `marker`; the flag reports whether any was found.
pub fn strip_payment_marker(text: &str, marker: &str) -> (String, bool) {
    if marker.is_empty() || !text.contains(marker) {
        return (text.to_string(), false);
    }
    (text.replace(marker, "").trim().to_string(), true)
}

pub fn shape_answer(answer: &str, policy: ImagePolicy, marker: &str) -> ChatResponse {
    let (answer, show_payment) = strip_payment_marker(answer, marker);
    let image_url = match policy {
        ImagePolicy::Url => extract_image_url(&answer),
        ImagePolicy::Markdown => None,
    };

    ChatResponse {
        answer,
        image_url,
        show_payment,
    }
}
