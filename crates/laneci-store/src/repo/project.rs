//! Project repository.

use async_trait::async_trait;
use laneci_core::{Project, ResourceId};

use crate::layout::PROJECTS_FILE;
use crate::{JsonDataSource, StoreError, StoreResult, VersionedStore};

#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn create(&self, project: Project) -> StoreResult<Project>;
    async fn get_by_id(&self, id: ResourceId) -> StoreResult<Project>;
    async fn get_by_name(&self, name: &str) -> StoreResult<Project>;
    async fn list(&self) -> StoreResult<Vec<Project>>;
    async fn update(&self, project: Project) -> StoreResult<Project>;
    async fn delete(&self, id: ResourceId) -> StoreResult<bool>;
    /// Write an empty `projects.json` if there is none yet.
    async fn ensure_exists(&self) -> StoreResult<()>;
}

/// `projects.json` implementation of ProjectRepo.
pub struct JsonProjectRepo {
    source: JsonDataSource<Project>,
    store: VersionedStore,
}

impl JsonProjectRepo {
    pub fn new(store: VersionedStore) -> Self {
        Self {
            source: JsonDataSource::new(store.clone(), PROJECTS_FILE),
            store,
        }
    }
}

#[async_trait]
impl ProjectRepo for JsonProjectRepo {
    async fn create(&self, project: Project) -> StoreResult<Project> {
        let name = project.project_name.clone();
        self.source
            .create(project)
            .await?
            .ok_or_else(|| StoreError::Duplicate(format!("project {}", name)))
    }

    async fn get_by_id(&self, id: ResourceId) -> StoreResult<Project> {
        self.source
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("project {}", id)))
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<Project> {
        self.source
            .find(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("project {}", name)))
    }

    async fn list(&self) -> StoreResult<Vec<Project>> {
        self.source.collection().await
    }

    async fn update(&self, project: Project) -> StoreResult<Project> {
        self.source.update(project).await
    }

    async fn delete(&self, id: ResourceId) -> StoreResult<bool> {
        match self.source.find_by_id(id).await? {
            Some(project) => Ok(self.source.delete(&project.project_name).await? > 0),
            None => Ok(false),
        }
    }

    async fn ensure_exists(&self) -> StoreResult<()> {
        if self.store.file_path(PROJECTS_FILE).exists() {
            return Ok(());
        }
        self.source.set_collection(Vec::new()).await
    }
}
