//! Remote code hosting contract, used during first-time setup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A repository created on the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    pub full_name: String,
    pub clone_url: String,
    pub html_url: String,
    pub private: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum HostingError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("failed to parse response: {0}")]
    Parse(String),
}

#[async_trait]
pub trait RemoteHosting: Send + Sync {
    async fn create_repository(&self, name: &str, private: bool)
    -> Result<RepoHandle, HostingError>;
}
