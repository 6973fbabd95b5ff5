//! Triggering and querying builds.

use laneci_core::{
    BuildParameters, BuildRecord, BuildRunnerOutputRow, LaneEngine, ResourceId,
};
use laneci_runner::BuildRunner;
use laneci_store::{BuildRepo, ProjectRepo};
use std::sync::Arc;
use tracing::info;

use crate::{ServiceError, ServiceResult, WorkerService};

#[derive(Clone)]
pub struct BuildService {
    project_repo: Arc<dyn ProjectRepo>,
    build_repo: Arc<dyn BuildRepo>,
    engine: Arc<dyn LaneEngine>,
    worker: Arc<WorkerService>,
}

impl BuildService {
    pub fn new(
        project_repo: Arc<dyn ProjectRepo>,
        build_repo: Arc<dyn BuildRepo>,
        engine: Arc<dyn LaneEngine>,
        worker: Arc<WorkerService>,
    ) -> Self {
        Self {
            project_repo,
            build_repo,
            engine,
            worker,
        }
    }

    /// Start a build of a project and return its id without waiting for it.
    ///
    /// Lane configuration errors surface here, before any record is written.
    /// On success exactly one `pending` record exists when this returns.
    pub async fn trigger_build<R>(
        &self,
        project_id: ResourceId,
        parameters: BuildParameters,
        on_row: R,
    ) -> ServiceResult<ResourceId>
    where
        R: FnMut(&BuildRunnerOutputRow) + Send + 'static,
    {
        let project = self.project_repo.get_by_id(project_id).await?;
        if !project.enabled {
            return Err(ServiceError::ProjectDisabled(project.project_name));
        }

        let mut runner = BuildRunner::new(
            project.clone(),
            BuildRecord::pending(project.id),
            self.engine.clone(),
        );
        runner.setup(parameters)?;

        let record = self.build_repo.create(runner.build().clone()).await?;
        runner.set_number(record.number);

        info!(
            project = %project.project_name,
            build_id = %record.id,
            number = record.number,
            "Build triggered"
        );
        self.worker.submit(project, runner, on_row);
        Ok(record.id)
    }

    /// Find a build by id in any project.
    pub async fn get_build(&self, id: ResourceId) -> ServiceResult<BuildRecord> {
        self.build_repo
            .find(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("build {}", id)))
    }

    pub async fn get_project_build(
        &self,
        project_id: ResourceId,
        id: ResourceId,
    ) -> ServiceResult<BuildRecord> {
        Ok(self.build_repo.get(project_id, id).await?)
    }

    /// Builds of a project, oldest first.
    pub async fn list_builds(&self, project_id: ResourceId) -> ServiceResult<Vec<BuildRecord>> {
        Ok(self.build_repo.list(project_id).await?)
    }

    /// Records left `pending` or `running` with no task behind them, e.g. after a crash.
    pub async fn unfinished_builds(
        &self,
        project_id: ResourceId,
    ) -> ServiceResult<Vec<BuildRecord>> {
        let in_flight = self.worker.in_flight();
        let builds = self.build_repo.list(project_id).await?;
        Ok(builds
            .into_iter()
            .filter(|b| !b.is_finished() && !in_flight.contains(&b.id))
            .collect())
    }

    /// Wait for a triggered build to reach its terminal state.
    pub async fn wait(&self, id: ResourceId) -> ServiceResult<BuildRecord> {
        self.worker.wait(id).await
    }
}
