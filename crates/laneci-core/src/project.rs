//! Projects and the repositories they build.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::credential::ProviderType;
use crate::{Entity, ResourceId};

/// Where a project's source lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub id: ResourceId,
    pub git_url: Url,
    /// `owner/name` on the hosting provider.
    pub full_name: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub provider_type_needed: ProviderType,
    /// Private repositories are hidden from unauthenticated listings.
    #[serde(default)]
    pub hidden: bool,
}

impl RepoConfig {
    pub fn new(git_url: Url, full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let name = full_name
            .rsplit('/')
            .next()
            .unwrap_or(full_name.as_str())
            .to_string();
        Self {
            id: ResourceId::new(),
            git_url,
            full_name,
            name,
            description: String::new(),
            provider_type_needed: ProviderType::GitHub,
            hidden: false,
        }
    }
}

/// A registered project. `lane` is `"<platform> <lane>"` or a bare `"<lane>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ResourceId,
    pub project_name: String,
    pub repo_config: RepoConfig,
    pub lane: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(project_name: impl Into<String>, repo_config: RepoConfig, lane: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            project_name: project_name.into(),
            repo_config,
            lane: lane.into(),
            enabled: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

impl Entity for Project {
    const KIND: &'static str = "project";

    fn id(&self) -> ResourceId {
        self.id
    }

    fn primary_key(&self) -> String {
        self.project_name.clone()
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}
