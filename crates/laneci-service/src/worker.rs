//! Background build execution.
//!
//! Every submitted build gets its own tokio task. The task prepares the project
//! checkout, runs the build runner and persists the terminal record. The
//! checkout stays leased to the build until the runner is done with it.

use futures::FutureExt;
use laneci_core::{
    BuildError, BuildRecord, BuildRunnerOutputRow, BuildStatus, Project, ProviderCredential,
    ResourceId,
};
use laneci_runner::BuildRunner;
use laneci_store::{BuildRepo, UserRepo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{ServiceError, ServiceResult, SourceCheckout};

type BuildTask = JoinHandle<ServiceResult<BuildRecord>>;

#[derive(Default)]
struct Tasks {
    running: HashMap<ResourceId, BuildTask>,
    /// Finished builds whose terminal record could not be persisted, kept until
    /// someone waits for them.
    unpersisted: HashMap<ResourceId, ServiceError>,
}

impl Tasks {
    /// Drop finished tasks, keeping the persistence failures.
    fn reap(&mut self) {
        let finished: Vec<ResourceId> = self
            .running
            .iter()
            .filter(|(_, task)| task.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for id in finished {
            match self.running.remove(&id).and_then(FutureExt::now_or_never) {
                Some(Ok(Err(e))) => {
                    self.unpersisted.insert(id, e);
                }
                Some(Err(e)) => error!(build_id = %id, error = %e, "Build task did not complete"),
                _ => {}
            }
        }
    }
}

pub struct WorkerService {
    build_repo: Arc<dyn BuildRepo>,
    user_repo: Arc<dyn UserRepo>,
    checkout: Arc<dyn SourceCheckout>,
    /// Owner of the credentials used for checkouts.
    ci_user_email: Option<String>,
    tasks: Mutex<Tasks>,
}

impl WorkerService {
    pub fn new(
        build_repo: Arc<dyn BuildRepo>,
        user_repo: Arc<dyn UserRepo>,
        checkout: Arc<dyn SourceCheckout>,
        ci_user_email: Option<String>,
    ) -> Self {
        Self {
            build_repo,
            user_repo,
            checkout,
            ci_user_email,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Run a configured runner in the background. Returns immediately.
    pub fn submit<R>(&self, project: Project, runner: BuildRunner, on_row: R)
    where
        R: FnMut(&BuildRunnerOutputRow) + Send + 'static,
    {
        let build_id = runner.build().id;
        let job = BuildJob {
            build_repo: self.build_repo.clone(),
            user_repo: self.user_repo.clone(),
            checkout: self.checkout.clone(),
            ci_user_email: self.ci_user_email.clone(),
        };

        let handle = tokio::spawn(job.run(project, runner, on_row));
        let mut tasks = self.tasks();
        tasks.reap();
        tasks.running.insert(build_id, handle);
    }

    /// Wait for a build's task to finish and return its terminal record.
    ///
    /// Fails when the task could not persist that record. Builds that were not
    /// submitted here, or were already waited for, are read back from the store.
    pub async fn wait(&self, build_id: ResourceId) -> ServiceResult<BuildRecord> {
        let (handle, unpersisted) = {
            let mut tasks = self.tasks();
            (tasks.running.remove(&build_id), tasks.unpersisted.remove(&build_id))
        };
        if let Some(e) = unpersisted {
            return Err(e);
        }
        if let Some(handle) = handle {
            match handle.await {
                Ok(result) => return result,
                Err(e) => {
                    error!(build_id = %build_id, error = %e, "Build task did not complete");
                }
            }
        }
        self.build_repo
            .find(build_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("build {}", build_id)))
    }

    /// Builds whose task is still running.
    pub fn in_flight(&self) -> Vec<ResourceId> {
        self.tasks()
            .running
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(id, _)| *id)
            .collect()
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What one build task needs, detached from the service.
struct BuildJob {
    build_repo: Arc<dyn BuildRepo>,
    user_repo: Arc<dyn UserRepo>,
    checkout: Arc<dyn SourceCheckout>,
    ci_user_email: Option<String>,
}

impl BuildJob {
    async fn run<R>(
        self,
        project: Project,
        mut runner: BuildRunner,
        on_row: R,
    ) -> ServiceResult<BuildRecord>
    where
        R: FnMut(&BuildRunnerOutputRow) + Send + 'static,
    {
        let pending = runner.build().clone();
        let credential = self.credential_for(&project).await;

        let record = match self.checkout.prepare(&project, credential.as_ref()).await {
            Ok(workspace) => {
                runner.set_workspace(workspace.path());
                let build_id = pending.id;
                let result = runner
                    .run(on_row, move |artifacts| {
                        info!(build_id = %build_id, artifacts = artifacts.len(), "Build completed");
                    })
                    .await;
                drop(workspace);
                match result {
                    Ok(record) => record,
                    Err(e) => {
                        error!(build_id = %pending.id, error = %e, "Build runner refused to run");
                        failed(pending, e.to_string())
                    }
                }
            }
            Err(e) => {
                error!(
                    build_id = %pending.id,
                    project = %project.project_name,
                    error = %e,
                    "Checkout failed"
                );
                failed(pending, format!("checkout failed: {}", e))
            }
        };

        match self.build_repo.update(record.clone()).await {
            Ok(persisted) => Ok(persisted),
            Err(e) => {
                error!(
                    build_id = %record.id,
                    status = %record.status,
                    error = %e,
                    "Failed to persist build"
                );
                Err(e.into())
            }
        }
    }

    async fn credential_for(&self, project: &Project) -> Option<ProviderCredential> {
        let email = self.ci_user_email.as_deref()?;
        match self.user_repo.find_by_email(email).await {
            Ok(Some(user)) => user
                .provider_credential(project.repo_config.provider_type_needed)
                .cloned(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Could not load CI user credentials");
                None
            }
        }
    }
}

/// Drive a record that never reached the engine to `failure`.
fn failed(mut build: BuildRecord, message: String) -> BuildRecord {
    if build.status == BuildStatus::Pending {
        let _ = build.mark_running();
    }
    build.error = Some(BuildError {
        message,
        context: Vec::new(),
    });
    if let Err(e) = build.finish(BuildStatus::Failure) {
        warn!(build_id = %build.id, error = %e, "Build was already finished");
    }
    build
}
