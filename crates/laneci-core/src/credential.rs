//! Provider credentials.
//!
//! Credentials are a closed set of tagged variants. Callers go through the
//! [`Credential`] capability trait instead of matching on the concrete provider.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ResourceId;

/// Code hosting providers a project repository can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "github")]
    GitHub,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::GitHub => f.write_str("github"),
        }
    }
}

/// What every credential can do, regardless of provider.
pub trait Credential {
    fn id(&self) -> ResourceId;
    fn token(&self) -> &str;
    fn provider_name(&self) -> &'static str;
    fn provider_type(&self) -> ProviderType;
    fn email(&self) -> &str;
}

/// GitHub personal access token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubCredential {
    pub id: ResourceId,
    pub email: String,
    pub api_token: String,
    pub full_name: Option<String>,
}

impl GitHubCredential {
    pub fn new(email: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            email: email.into(),
            api_token: api_token.into(),
            full_name: None,
        }
    }
}

impl fmt::Debug for GitHubCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubCredential")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("api_token", &"[REDACTED]")
            .field("full_name", &self.full_name)
            .finish()
    }
}

/// Stored as `{"type": "github", ...}` inside a user's `provider_credentials`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderCredential {
    #[serde(rename = "github")]
    GitHub(GitHubCredential),
}

impl ProviderCredential {
    pub fn set_token(&mut self, token: String) {
        match self {
            ProviderCredential::GitHub(c) => c.api_token = token,
        }
    }
}

impl Credential for ProviderCredential {
    fn id(&self) -> ResourceId {
        match self {
            ProviderCredential::GitHub(c) => c.id,
        }
    }

    fn token(&self) -> &str {
        match self {
            ProviderCredential::GitHub(c) => &c.api_token,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            ProviderCredential::GitHub(_) => "GitHub",
        }
    }

    fn provider_type(&self) -> ProviderType {
        match self {
            ProviderCredential::GitHub(_) => ProviderType::GitHub,
        }
    }

    fn email(&self) -> &str {
        match self {
            ProviderCredential::GitHub(c) => &c.email,
        }
    }
}

impl From<GitHubCredential> for ProviderCredential {
    fn from(credential: GitHubCredential) -> Self {
        ProviderCredential::GitHub(credential)
    }
}
