//! Project management.

use laneci_config::LaneSpec;
use laneci_core::{Project, RepoConfig, ResourceId};
use laneci_store::ProjectRepo;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::{ServiceError, ServiceResult};

#[derive(Clone)]
pub struct ProjectService {
    repo: Arc<dyn ProjectRepo>,
}

impl ProjectService {
    pub fn new(repo: Arc<dyn ProjectRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> ServiceResult<Vec<Project>> {
        Ok(self.repo.list().await?)
    }

    pub async fn get(&self, id: ResourceId) -> ServiceResult<Project> {
        Ok(self.repo.get_by_id(id).await?)
    }

    pub async fn get_by_name(&self, name: &str) -> ServiceResult<Project> {
        Ok(self.repo.get_by_name(name).await?)
    }

    /// Register a project. The lane is validated up front.
    pub async fn create(
        &self,
        name: &str,
        git_url: &str,
        full_name: &str,
        lane: &str,
    ) -> ServiceResult<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::InvalidInput(
                "project name must not be empty".to_string(),
            ));
        }
        LaneSpec::parse(lane)?;
        let git_url = Url::parse(git_url)
            .map_err(|e| ServiceError::InvalidInput(format!("invalid git url: {}", e)))?;

        let project = Project::new(name, RepoConfig::new(git_url, full_name), lane.trim());
        let project = self.repo.create(project).await?;
        info!(project_id = %project.id, name = %project.project_name, lane = %project.lane, "Created project");
        Ok(project)
    }

    pub async fn update(&self, project: Project) -> ServiceResult<Project> {
        LaneSpec::parse(&project.lane)?;
        Ok(self.repo.update(project).await?)
    }

    pub async fn set_enabled(&self, id: ResourceId, enabled: bool) -> ServiceResult<Project> {
        let mut project = self.repo.get_by_id(id).await?;
        project.enabled = enabled;
        let project = self.repo.update(project).await?;
        info!(project_id = %project.id, enabled, "Project toggled");
        Ok(project)
    }

    pub async fn delete(&self, id: ResourceId) -> ServiceResult<bool> {
        Ok(self.repo.delete(id).await?)
    }
}
