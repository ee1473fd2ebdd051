use crate::config::GithubConfig;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

const BOT_EMAIL: &str = "auto@bot.com";
const BOT_NAME: &str = "AutoUploader";
const REMOTE: &str = "origin";
const MIN_BARE_TOKEN_LEN: usize = 8;

static URL_USERINFO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://[^/:@\s]+:)[^@\s]+@").expect("valid regex"));

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("git {command} failed: {detail}")]
    CommandFailed { command: String, detail: String },
    #[error("git {0} timed out")]
    Timeout(String),
    #[error("Failed to run git: {0}")]
    Io(#[from] std::io::Error),
}

/// Records new catalog state in the system of record.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, paths: &[PathBuf], message: &str) -> Result<(), PublishError>;
}

pub struct NoopPublisher;

#[async_trait]
impl Publisher for NoopPublisher {
    async fn publish(&self, paths: &[PathBuf], message: &str) -> Result<(), PublishError> {
        debug!("Publishing disabled, skipping '{}' ({} paths)", message, paths.len());
        Ok(())
    }
}

pub struct GitPublisher {
    repo_dir: PathBuf,
    remote_url: String,
    token: String,
    branch: String,
    force: bool,
    timeout: Duration,
}

impl GitPublisher {
    pub fn new(repo_dir: &Path, config: &GithubConfig) -> Self {
        info!(
            "Git publisher targeting {}/{} ({}{})",
            config.user,
            config.repo,
            config.branch,
            if config.force_push { ", force" } else { "" }
        );
        Self {
            repo_dir: repo_dir.to_path_buf(),
            remote_url: config.remote_url(),
            token: config.token.expose().to_string(),
            branch: config.branch.clone(),
            force: config.force_push,
            timeout: Duration::from_secs(config.command_timeout),
        }
    }

    fn redact(&self, text: &str) -> String {
        let text = URL_USERINFO.replace_all(text, "${1}***@");
        if self.token.len() >= MIN_BARE_TOKEN_LEN {
            text.replace(&self.token, "***")
        } else {
            text.into_owned()
        }
    }

    /// Paths handed to git must be relative to the repository it runs in.
    fn repo_relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.repo_dir).unwrap_or(path)
    }

    async fn git(&self, args: &[&str]) -> Result<String, PublishError> {
        let name = args.first().copied().unwrap_or_default().to_string();
        debug!("Running git {}", name);

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("git {} timed out after {:?}", name, self.timeout);
                return Err(PublishError::Timeout(name));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = match output.status.code() {
                Some(code) => format!("exit code {}: {}{}", code, stderr.trim(), stdout.trim()),
                None => format!("terminated by signal: {}", stderr.trim()),
            };
            return Err(PublishError::CommandFailed {
                command: name,
                detail: self.redact(&detail),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn ensure_identity(&self) -> Result<(), PublishError> {
        if self.git(&["config", "user.email"]).await.is_err() {
            self.git(&["config", "user.email", BOT_EMAIL]).await?;
            self.git(&["config", "user.name", BOT_NAME]).await?;
        }
        Ok(())
    }

    async fn ensure_remote(&self) -> Result<(), PublishError> {
        let remotes = self.git(&["remote"]).await?;
        if remotes.lines().any(|r| r.trim() == REMOTE) {
            self.git(&["remote", "set-url", REMOTE, self.remote_url.as_str()]).await?;
        } else {
            self.git(&["remote", "add", REMOTE, self.remote_url.as_str()]).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, paths: &[PathBuf], message: &str) -> Result<(), PublishError> {
        self.ensure_identity().await?;

        let mut add: Vec<String> = vec!["add".into(), "--".into()];
        add.extend(
            paths
                .iter()
                .map(|p| self.repo_relative(p).to_string_lossy().into_owned()),
        );
        let add: Vec<&str> = add.iter().map(String::as_str).collect();
        self.git(&add).await?;

        self.git(&["commit", "-m", message]).await?;
        self.ensure_remote().await?;

        let refspec = format!("HEAD:{}", self.branch);
        let mut push = vec!["push"];
        if self.force {
            push.push("--force");
        }
        push.extend([REMOTE, refspec.as_str()]);
        self.git(&push).await?;

        info!("Published '{}'", message);
        Ok(())
    }
}

pub fn commit_message(filename: &str) -> String {
    format!("Add image {} via Web", filename)
}
