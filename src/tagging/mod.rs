mod gemini;
pub mod types;

use crate::config::Config;
use std::sync::Arc;
use tracing::{info, warn};

pub use gemini::GeminiTagger;
pub use types::Tagger;

const DEFAULT_IMAGE_MIME: &str = "image/png";

pub fn create_tagger(config: &Config) -> Option<Arc<dyn Tagger>> {
    match config.gemini.api_key.as_ref().filter(|k| !k.is_empty()) {
        Some(key) => Some(Arc::new(GeminiTagger::new(key.clone(), &config.gemini.model))
            as Arc<dyn Tagger>),
        None => {
            info!("No Gemini API key configured, uploads use filename descriptions");
            None
        }
    }
}

/// Cleans model output into a plain comma-separated keyword line.
pub fn clean_description(raw: &str) -> String {
    let mut text = raw.trim().replace("**", "");
    if let Some((_, tail)) = text.rsplit_once(':') {
        text = tail.trim().to_string();
    }
    text.replace('\n', ", ")
}

pub fn fallback_description(filename: &str) -> String {
    format!("new art ({})", filename)
}

/// Describes an image, falling back to the filename when tagging is
/// unavailable or fails.
pub async fn describe_or_fallback(
    tagger: Option<&dyn Tagger>,
    image: &[u8],
    filename: &str,
) -> String {
    let Some(tagger) = tagger else {
        return fallback_description(filename);
    };

    match tagger.describe(image, &mime_for(filename)).await {
        Ok(raw) => {
            let cleaned = clean_description(&raw);
            if cleaned.is_empty() {
                fallback_description(filename)
            } else {
                cleaned
            }
        }
        Err(e) => {
            warn!("Tagging '{}' with {} failed: {}", filename, tagger.model(), e);
            fallback_description(filename)
        }
    }
}

/// Image MIME type guessed from the extension, `image/png` when unknown.
pub fn mime_for(filename: &str) -> String {
    mime_guess::from_path(filename)
        .iter()
        .find(|m| m.essence_str().starts_with("image/"))
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::types::TaggingError;
    use async_trait::async_trait;

    struct Canned(Result<&'static str, ()>);

    #[async_trait]
    impl Tagger for Canned {
        fn model(&self) -> &str {
            "canned"
        }

        async fn describe(&self, _image: &[u8], _mime: &str) -> Result<String, TaggingError> {
            self.0
                .map(str::to_string)
                .map_err(|_| TaggingError::EmptyResponse)
        }
    }

    #[test]
    fn strips_bold_and_label() {
        assert_eq!(
            clean_description("**Keywords:** Mountain, River, Serene"),
            "Mountain, River, Serene"
        );
    }

    #[test]
    fn keeps_text_after_last_colon() {
        assert_eq!(
            clean_description("Product Description: Keywords: Sea, Calm"),
            "Sea, Calm"
        );
    }

    #[test]
    fn newlines_become_separators() {
        assert_eq!(
            clean_description("Mountain\nRiver\nSerene\n"),
            "Mountain, River, Serene"
        );
    }

    #[test]
    fn plain_keywords_pass_through() {
        let raw = "Mount Fuji, Sunset, Peaceful, Red, Nature, Dreamy, Art, Landscape, Calm, Beautiful";
        assert_eq!(clean_description(raw), raw);
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for("a.JPG"), "image/jpeg");
        assert_eq!(mime_for("a.webp"), "image/webp");
        assert_eq!(mime_for("scan.tiff"), "image/tiff");
        assert_eq!(mime_for("notes.txt"), "image/png");
        assert_eq!(mime_for("noext"), "image/png");
    }

    #[tokio::test]
    async fn falls_back_without_tagger_or_on_failure() {
        assert_eq!(
            describe_or_fallback(None, b"x", "cat.png").await,
            "new art (cat.png)"
        );

        let failing = Canned(Err(()));
        assert_eq!(
            describe_or_fallback(Some(&failing as &dyn Tagger), b"x", "cat.png").await,
            "new art (cat.png)"
        );

        let ok = Canned(Ok("**Keywords**: Cat, Cozy"));
        assert_eq!(
            describe_or_fallback(Some(&ok as &dyn Tagger), b"x", "cat.png").await,
            "Cat, Cozy"
        );
    }
}
