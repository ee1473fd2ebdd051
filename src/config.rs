use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::answer::ImagePolicy;
use crate::dify::ResponseMode;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("dify.api_key is not set (config file or DIFY_API_KEY)")]
    MissingDifyKey,
    #[error("Invalid bind address '{0}'")]
    InvalidBind(String),
    #[error("github.{0} is required when publishing is enabled")]
    MissingGithub(&'static str),
}

/// A string that never shows up in `Debug` output or logs.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("\"***\"")
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DifyConfig {
    pub api_key: Secret,
    pub url: String,
    pub response_mode: ResponseMode,
    pub user: String,
    pub image_policy: ImagePolicy,
    pub payment_marker: String,
    pub passthrough: bool,
}

impl Default for DifyConfig {
    fn default() -> Self {
        Self {
            api_key: Secret::default(),
            url: "https://api.dify.ai/v1/chat-messages".to_string(),
            response_mode: ResponseMode::Streaming,
            user: "render-user-01".to_string(),
            image_policy: ImagePolicy::Url,
            payment_marker: "[[PAYMENT]]".to_string(),
            passthrough: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<Secret>,
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-flash-latest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
        }
    }
}

impl StorageConfig {
    pub fn images_dir(&self) -> PathBuf {
        self.base_dir.join("static").join("images")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.base_dir.join("data.csv")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub enabled: bool,
    pub user: String,
    pub repo: String,
    pub token: Secret,
    pub branch: String,
    pub force_push: bool,
    pub command_timeout: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user: String::new(),
            repo: String::new(),
            token: Secret::default(),
            branch: "main".to_string(),
            force_push: true,
            command_timeout: 60,
        }
    }
}

impl GithubConfig {
    /// Public URL the pushed image will be served from.
    pub fn raw_url(&self, filename: &str) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}/static/images/{}",
            self.user, self.repo, self.branch, filename
        )
    }

    pub fn remote_url(&self) -> String {
        format!(
            "https://{}:{}@github.com/{}/{}.git",
            self.user,
            self.token.expose(),
            self.user,
            self.repo
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub dify: DifyConfig,
    pub gemini: GeminiConfig,
    pub storage: StorageConfig,
    pub github: GithubConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn load() -> Result<Self> {
        let path = std::env::var("CURATOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup("DIFY_API_KEY") {
            self.dify.api_key = Secret::new(v);
        }
        if let Some(v) = lookup("DIFY_URL") {
            self.dify.url = v;
        }
        if let Some(v) = lookup("GEMINI_API_KEY") {
            self.gemini.api_key = Some(Secret::new(v));
        }
        if let Some(v) = lookup("GITHUB_USER") {
            self.github.user = v;
        }
        if let Some(v) = lookup("GITHUB_REPO") {
            self.github.repo = v;
        }
        if let Some(v) = lookup("GITHUB_TOKEN") {
            self.github.token = Secret::new(v);
        }
        if let Some(v) = lookup("GITHUB_BRANCH") {
            self.github.branch = v;
        }
        if let Some(v) = lookup("CURATOR_BIND") {
            self.server.bind = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dify.api_key.is_empty() {
            return Err(ConfigError::MissingDifyKey);
        }
        self.bind_addr()?;

        if self.github.enabled {
            if self.github.user.trim().is_empty() {
                return Err(ConfigError::MissingGithub("user"));
            }
            if self.github.repo.trim().is_empty() {
                return Err(ConfigError::MissingGithub("repo"));
            }
            if self.github.token.is_empty() {
                return Err(ConfigError::MissingGithub("token"));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.server.bind.clone()))
    }
}
