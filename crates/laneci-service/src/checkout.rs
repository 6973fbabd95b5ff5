//! Project checkouts the lane engine runs in.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use laneci_core::{Credential, Project, ProviderCredential, ResourceId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::process::Command;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// Prepares the directory a project's lane runs in.
#[async_trait]
pub trait SourceCheckout: Send + Sync {
    async fn prepare(
        &self,
        project: &Project,
        credential: Option<&ProviderCredential>,
    ) -> Result<Workspace, CheckoutError>;
}

/// A prepared checkout. While it is alive no other build can prepare the same
/// directory.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    _lease: Option<OwnedMutexGuard<()>>,
}

impl Workspace {
    /// A directory nobody else competes for.
    pub fn unleased(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _lease: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Clones each project into `<work_dir>/<project-id>` and fast-forwards it on
/// later builds. Builds of one project take turns on the directory.
pub struct GitCheckout {
    work_dir: PathBuf,
    leases: Mutex<HashMap<ResourceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl GitCheckout {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub fn repo_path(&self, project: &Project) -> PathBuf {
        self.work_dir.join(project.id.to_string())
    }

    fn lease(&self, project_id: ResourceId) -> Arc<tokio::sync::Mutex<()>> {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        leases.entry(project_id).or_default().clone()
    }

    async fn clone_fresh(
        &self,
        clone_url: &str,
        path: &Path,
        token: Option<&str>,
    ) -> Result<(), CheckoutError> {
        if path.exists() {
            tokio::fs::remove_dir_all(path).await?;
        }

        info!(clone_url = %clone_url, path = %path.display(), "Cloning project repository");
        let output = git(token)
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg(clone_url)
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            warn!(clone_url = %clone_url, "Git clone failed");
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CheckoutError::CloneFailed(redact(&stderr, token)));
        }

        info!(path = %path.display(), "Project repository cloned");
        Ok(())
    }

    async fn fast_forward(&self, path: &Path, token: Option<&str>) -> Result<(), CheckoutError> {
        info!(path = %path.display(), "Pulling latest changes");
        let output = git(token)
            .args(["pull", "--ff-only"])
            .current_dir(path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CheckoutError::PullFailed(redact(&stderr, token)));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceCheckout for GitCheckout {
    async fn prepare(
        &self,
        project: &Project,
        credential: Option<&ProviderCredential>,
    ) -> Result<Workspace, CheckoutError> {
        let lease = self.lease(project.id).lock_owned().await;
        debug!(project = %project.project_name, "Acquired checkout lease");
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let clone_url = project.repo_config.git_url.as_str();
        let token = credential.map(|c| c.token());
        let path = self.repo_path(project);

        let pulled = if path.join(".git").exists() {
            match self.fast_forward(&path, token).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Git pull failed, re-cloning");
                    false
                }
            }
        } else {
            false
        };
        if !pulled {
            self.clone_fresh(clone_url, &path, token).await?;
        }

        Ok(Workspace {
            path,
            _lease: Some(lease),
        })
    }
}

/// Always hands out the same directory. Used for local runs and tests.
pub struct LocalWorkspace {
    path: PathBuf,
}

impl LocalWorkspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SourceCheckout for LocalWorkspace {
    async fn prepare(
        &self,
        _project: &Project,
        _credential: Option<&ProviderCredential>,
    ) -> Result<Workspace, CheckoutError> {
        tokio::fs::create_dir_all(&self.path).await?;
        Ok(Workspace::unleased(self.path.clone()))
    }
}

/// A `git` command authenticated with `token`.
///
/// The token travels as an HTTP header set through the environment, so it shows
/// up neither in the remote URL stored in `.git/config` nor on the command line.
fn git(token: Option<&str>) -> Command {
    let mut command = Command::new("git");
    command
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command.envs(auth_env(token));
    command
}

fn auth_env(token: Option<&str>) -> Vec<(&'static str, String)> {
    match token {
        Some(token) if !token.is_empty() => vec![
            ("GIT_CONFIG_COUNT", "1".to_string()),
            ("GIT_CONFIG_KEY_0", "http.extraHeader".to_string()),
            (
                "GIT_CONFIG_VALUE_0",
                format!("Authorization: Basic {}", basic_credentials(token)),
            ),
        ],
        _ => Vec::new(),
    }
}

/// GitHub accepts any user name next to a token.
fn basic_credentials(token: &str) -> String {
    STANDARD.encode(format!("x-access-token:{}", token))
}

/// Remove the token, raw or encoded, from git output.
fn redact(text: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => text
            .replace(token, "[REDACTED]")
            .replace(&basic_credentials(token), "[REDACTED]"),
        _ => text.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("clone failed: {0}")]
    CloneFailed(String),

    #[error("pull failed: {0}")]
    PullFailed(String),
}
