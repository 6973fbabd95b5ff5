//! GitHub REST client used during setup.

use async_trait::async_trait;
use laneci_core::{HostingError, RemoteHosting, RepoHandle};
use serde::{Deserialize, Serialize};
use tracing::info;

/// GitHub API client authenticated as the CI user.
pub struct GitHubHosting {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl GitHubHosting {
    pub fn new(api_base: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl RemoteHosting for GitHubHosting {
    async fn create_repository(
        &self,
        name: &str,
        private: bool,
    ) -> Result<RepoHandle, HostingError> {
        let request = CreateRepoRequest {
            name,
            private,
            auto_init: true,
            description: "laneci configuration",
        };

        let response = self
            .client
            .post(format!("{}/user/repos", self.api_base))
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("User-Agent", "laneci")
            .header("Accept", "application/vnd.github+json")
            .json(&request)
            .send()
            .await
            .map_err(|e| HostingError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(HostingError::Api(format!(
                "Failed to create repository ({}): {}",
                status, text
            )));
        }

        let repo: GitHubRepo = response
            .json()
            .await
            .map_err(|e| HostingError::Parse(e.to_string()))?;

        info!(full_name = %repo.full_name, private = repo.private, "Created repository");
        Ok(repo.into())
    }
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    private: bool,
    auto_init: bool,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    full_name: String,
    clone_url: String,
    html_url: String,
    private: bool,
}

impl From<GitHubRepo> for RepoHandle {
    fn from(repo: GitHubRepo) -> Self {
        RepoHandle {
            full_name: repo.full_name,
            clone_url: repo.clone_url,
            html_url: repo.html_url,
            private: repo.private,
        }
    }
}
