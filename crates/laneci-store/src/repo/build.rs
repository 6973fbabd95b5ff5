//! Build history repository.
//!
//! Each project has its own `builds/<project-id>.json` file and its own data
//! source, so builds of different projects never contend for a lock.

use async_trait::async_trait;
use laneci_core::{BuildRecord, ResourceId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::layout::{BUILDS_DIR, builds_file};
use crate::{JsonDataSource, StoreError, StoreResult, VersionedStore};

#[async_trait]
pub trait BuildRepo: Send + Sync {
    /// Persist a new build, assigning the next per-project number.
    async fn create(&self, build: BuildRecord) -> StoreResult<BuildRecord>;
    async fn get(&self, project_id: ResourceId, id: ResourceId) -> StoreResult<BuildRecord>;
    /// Look a build up without knowing its project.
    async fn find(&self, id: ResourceId) -> StoreResult<Option<BuildRecord>>;
    /// Builds of a project ordered by number.
    async fn list(&self, project_id: ResourceId) -> StoreResult<Vec<BuildRecord>>;
    async fn update(&self, build: BuildRecord) -> StoreResult<BuildRecord>;
}

/// `builds/<project-id>.json` implementation of BuildRepo.
pub struct JsonBuildRepo {
    store: VersionedStore,
    sources: Mutex<HashMap<ResourceId, Arc<JsonDataSource<BuildRecord>>>>,
}

impl JsonBuildRepo {
    pub fn new(store: VersionedStore) -> Self {
        Self {
            store,
            sources: Mutex::new(HashMap::new()),
        }
    }

    fn source(&self, project_id: ResourceId) -> Arc<JsonDataSource<BuildRecord>> {
        let mut sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        sources
            .entry(project_id)
            .or_insert_with(|| {
                Arc::new(JsonDataSource::new(
                    self.store.clone(),
                    builds_file(project_id),
                ))
            })
            .clone()
    }

    /// Projects that have a builds file on disk.
    async fn known_projects(&self) -> StoreResult<Vec<ResourceId>> {
        let dir = self.store.file_path(BUILDS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut projects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<ResourceId>().ok());
            match parsed {
                Some(project_id) => projects.push(project_id),
                None => debug!(path = %path.display(), "Skipping unrecognized builds file"),
            }
        }
        Ok(projects)
    }
}

#[async_trait]
impl BuildRepo for JsonBuildRepo {
    async fn create(&self, build: BuildRecord) -> StoreResult<BuildRecord> {
        let id = build.id;
        let source = self.source(build.project_id);
        source
            .insert_with(move |current| {
                let number = current.iter().map(|b| b.number).max().unwrap_or(0) + 1;
                Some(BuildRecord { number, ..build })
            })
            .await?
            .ok_or_else(|| StoreError::Duplicate(format!("build {}", id)))
    }

    async fn get(&self, project_id: ResourceId, id: ResourceId) -> StoreResult<BuildRecord> {
        self.source(project_id)
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("build {}", id)))
    }

    async fn find(&self, id: ResourceId) -> StoreResult<Option<BuildRecord>> {
        for project_id in self.known_projects().await? {
            if let Some(build) = self.source(project_id).find_by_id(id).await? {
                return Ok(Some(build));
            }
        }
        Ok(None)
    }

    async fn list(&self, project_id: ResourceId) -> StoreResult<Vec<BuildRecord>> {
        let mut builds = self.source(project_id).collection().await?;
        builds.sort_by_key(|b| b.number);
        Ok(builds)
    }

    async fn update(&self, build: BuildRecord) -> StoreResult<BuildRecord> {
        self.source(build.project_id).update(build).await
    }
}
