use crate::catalog::{Catalog, CatalogError, CatalogRow};
use crate::config::{Config, GithubConfig};
use crate::publish::{Publisher, PublishError, commit_message};
use crate::tagging::{Tagger, describe_or_fallback};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Error: No image part in request")]
    MissingFile,
    #[error("Error: No selected file")]
    EmptyFilename,
    #[error("Error: Uploaded file is empty")]
    EmptyFile,
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Server error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Git push failed: {0}")]
    Publish(#[from] PublishError),
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Save → describe → catalog → publish, one upload at a time.
pub struct UploadPipeline {
    images_dir: PathBuf,
    catalog: Catalog,
    github: GithubConfig,
    tagger: Option<Arc<dyn Tagger>>,
    publisher: Arc<dyn Publisher>,
    // Serializes uploads so catalog appends and commits never interleave.
    lock: Mutex<()>,
}

impl UploadPipeline {
    pub fn new(
        config: &Config,
        tagger: Option<Arc<dyn Tagger>>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            images_dir: config.storage.images_dir(),
            catalog: Catalog::new(config.storage.catalog_path()),
            github: config.github.clone(),
            tagger,
            publisher,
            lock: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn handle(&self, file: Option<UploadedFile>) -> Result<CatalogRow, UploadError> {
        let file = file.ok_or(UploadError::MissingFile)?;
        let filename = sanitize_filename(&file.filename).ok_or(UploadError::EmptyFilename)?;
        if file.bytes.is_empty() {
            return Err(UploadError::EmptyFile);
        }

        let _guard = self.lock.lock().await;
        info!("Processing upload '{}' ({} bytes)", filename, file.bytes.len());

        tokio::fs::create_dir_all(&self.images_dir).await?;
        let image_path = self.images_dir.join(&filename);
        if image_path.exists() {
            warn!("Overwriting existing image '{}'", filename);
        }
        tokio::fs::write(&image_path, &file.bytes).await?;

        let description =
            describe_or_fallback(self.tagger.as_deref(), &file.bytes, &filename).await;

        let row = CatalogRow {
            description,
            url: self.github.raw_url(&filename),
        };
        self.catalog.append(row.clone()).await?;

        self.publisher
            .publish(
                &[image_path, self.catalog.path().to_path_buf()],
                &commit_message(&filename),
            )
            .await?;

        info!("Upload '{}' cataloged as {}", filename, row.url);
        Ok(row)
    }
}

/// Reduces a client-supplied name to a safe, lowercased basename.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .replace(['\0', ':', '*', '?', '"', '<', '>', '|'], "_")
        .trim()
        .to_lowercase()
        .chars()
        .take(200)
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => None,
        _ => Some(cleaned),
    }
}
