use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Catalog CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Catalog task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub description: String,
    pub url: String,
}

/// Append-only CSV of uploaded images, oldest first.
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn rows(&self) -> Result<Vec<CatalogRow>, CatalogError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_rows(&path)).await?
    }

    pub async fn append(&self, row: CatalogRow) -> Result<(), CatalogError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_row(&path, &row)).await?
    }
}

fn read_rows(path: &Path) -> Result<Vec<CatalogRow>, CatalogError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<CatalogRow>, csv::Error>>()?;
    Ok(rows)
}

fn append_row(path: &Path, row: &CatalogRow) -> Result<(), CatalogError> {
    let is_new = !path.exists() || std::fs::metadata(path)?.len() == 0;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;

    debug!("Appended catalog row for {}", row.url);
    Ok(())
}
