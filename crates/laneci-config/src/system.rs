//! System settings.
//!
//! Non-secret settings live in `laneci.kdl`:
//!
//! ```kdl
//! config-repo "https://github.com/acme/ci-config.git" branch="main" path="/var/lib/laneci/config"
//! work-dir "/var/lib/laneci/workspaces"
//! committer name="laneci" email="ci@acme.dev"
//! ci-user email="ci@acme.dev"
//! engine "fastlane" {
//!     arg "--verbose"
//! }
//! github api="https://api.github.com"
//! ```
//!
//! Secrets (CI user password, clone token, encryption key) only come from the
//! environment.

use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{ConfigError, ConfigResult};

pub const ENV_CONFIG_REPO_URL: &str = "LANECI_CONFIG_REPO_URL";
pub const ENV_CONFIG_REPO_PATH: &str = "LANECI_CONFIG_REPO_PATH";
pub const ENV_WORK_DIR: &str = "LANECI_WORK_DIR";
pub const ENV_CI_USER: &str = "LANECI_CI_USER";
pub const ENV_CI_PASSWORD: &str = "LANECI_CI_PASSWORD";
pub const ENV_CLONE_TOKEN: &str = "LANECI_CLONE_TOKEN";
pub const ENV_ENCRYPTION_KEY: &str = "LANECI_ENCRYPTION_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRepoSettings {
    /// Remote of the configuration repository. `None` keeps the store local-only.
    pub url: Option<String>,
    pub branch: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitterSettings {
    pub name: String,
    pub email: String,
}

#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CiUserSettings {
    pub email: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
}

impl std::fmt::Debug for CiUserSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiUserSettings")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub config_repo: ConfigRepoSettings,
    /// Where project checkouts are kept.
    pub work_dir: PathBuf,
    pub committer: CommitterSettings,
    pub ci_user: CiUserSettings,
    /// Token used for the initial clone of the configuration repository.
    #[serde(skip)]
    pub clone_token: Option<String>,
    /// Passphrase sealing provider tokens in `users.json`.
    #[serde(skip)]
    pub encryption_key: Option<String>,
    pub engine: EngineSettings,
    pub github_api: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |secret: &Option<String>| secret.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Settings")
            .field("config_repo", &self.config_repo)
            .field("work_dir", &self.work_dir)
            .field("committer", &self.committer)
            .field("ci_user", &self.ci_user)
            .field("clone_token", &redacted(&self.clone_token))
            .field("encryption_key", &redacted(&self.encryption_key))
            .field("engine", &self.engine)
            .field("github_api", &self.github_api)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_repo: ConfigRepoSettings {
                url: None,
                branch: "main".to_string(),
                path: PathBuf::from("laneci-config"),
            },
            work_dir: std::env::temp_dir().join("laneci-workspaces"),
            committer: CommitterSettings {
                name: "laneci".to_string(),
                email: "laneci@localhost".to_string(),
            },
            ci_user: CiUserSettings::default(),
            clone_token: None,
            encryption_key: None,
            engine: EngineSettings {
                program: "fastlane".to_string(),
                args: Vec::new(),
            },
            github_api: "https://api.github.com".to_string(),
        }
    }
}

impl Settings {
    /// Apply `LANECI_*` environment variables on top of the file settings.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup(ENV_CONFIG_REPO_URL) {
            self.config_repo.url = Some(url);
        }
        if let Some(path) = lookup(ENV_CONFIG_REPO_PATH) {
            self.config_repo.path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(ENV_WORK_DIR) {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(email) = lookup(ENV_CI_USER) {
            self.ci_user.email = Some(email);
        }
        if let Some(password) = lookup(ENV_CI_PASSWORD) {
            self.ci_user.password = Some(password);
        }
        if let Some(token) = lookup(ENV_CLONE_TOKEN) {
            self.clone_token = Some(token);
        }
        if let Some(key) = lookup(ENV_ENCRYPTION_KEY) {
            self.encryption_key = Some(key);
        }
    }

    /// Names of the environment variables a complete setup still lacks.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.config_repo.url.is_none() {
            missing.push(ENV_CONFIG_REPO_URL);
        }
        if self.ci_user.email.is_none() {
            missing.push(ENV_CI_USER);
        }
        if self.ci_user.password.is_none() {
            missing.push(ENV_CI_PASSWORD);
        }
        if self.clone_token.is_none() {
            missing.push(ENV_CLONE_TOKEN);
        }
        if self.encryption_key.is_none() {
            missing.push(ENV_ENCRYPTION_KEY);
        }
        missing
    }
}

/// Load settings from `path` (if it exists), then apply environment overrides.
pub fn load_settings(path: &Path) -> ConfigResult<Settings> {
    let mut settings = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        parse_settings(&content)?
    } else {
        debug!(path = %path.display(), "No settings file, using defaults");
        Settings::default()
    };
    settings.apply_env();
    Ok(settings)
}

/// Parse system settings from KDL text. Unset fields keep their defaults.
pub fn parse_settings(kdl: &str) -> ConfigResult<Settings> {
    let doc: KdlDocument = kdl.parse()?;
    let mut settings = Settings::default();

    for node in doc.nodes() {
        match node.name().value() {
            "config-repo" => {
                settings.config_repo.url = get_first_string_arg(node);
                if let Some(branch) = get_string_prop(node, "branch") {
                    settings.config_repo.branch = branch;
                }
                if let Some(path) = get_string_prop(node, "path") {
                    settings.config_repo.path = PathBuf::from(path);
                }
            }
            "work-dir" => {
                let dir = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("work-dir path".to_string()))?;
                settings.work_dir = PathBuf::from(dir);
            }
            "committer" => {
                settings.committer.name = get_string_prop(node, "name")
                    .ok_or_else(|| ConfigError::MissingField("committer name".to_string()))?;
                settings.committer.email = get_string_prop(node, "email")
                    .ok_or_else(|| ConfigError::MissingField("committer email".to_string()))?;
            }
            "ci-user" => {
                settings.ci_user.email = get_string_prop(node, "email");
            }
            "engine" => {
                let program = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("engine program".to_string()))?;
                if program.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "engine".to_string(),
                        message: "program must not be empty".to_string(),
                    });
                }
                settings.engine.program = program;
                settings.engine.args = node
                    .children()
                    .map(|children| {
                        children
                            .nodes()
                            .iter()
                            .filter(|child| child.name().value() == "arg")
                            .filter_map(get_first_string_arg)
                            .collect()
                    })
                    .unwrap_or_default();
            }
            "github" => {
                if let Some(api) = get_string_prop(node, "api") {
                    settings.github_api = api.trim_end_matches('/').to_string();
                }
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if settings.config_repo.branch.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "config-repo branch".to_string(),
            message: "branch must not be empty".to_string(),
        });
    }

    Ok(settings)
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}
