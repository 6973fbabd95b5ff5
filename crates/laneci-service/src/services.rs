//! Service context.

use laneci_config::Settings;
use laneci_core::{GitHubCredential, LaneEngine, RemoteHosting};
use laneci_runner::CommandLaneEngine;
use laneci_store::{
    BuildRepo, CommitIdentity, JsonBuildRepo, JsonNotificationRepo, JsonProjectRepo,
    JsonUserRepo, NotificationRepo, ProjectRepo, SecretCipher, UserRepo, VersionedStore,
};
use std::sync::Arc;

use crate::{
    BuildService, GitCheckout, GitHubHosting, NotificationService, OnboardingService,
    ProjectService, SourceCheckout, UserService, WorkerService,
};

/// Everything a caller needs, built once at process start.
#[derive(Clone)]
pub struct Services {
    pub settings: Arc<Settings>,
    pub store: VersionedStore,
    pub user_repo: Arc<dyn UserRepo>,
    pub project_repo: Arc<dyn ProjectRepo>,
    pub notification_repo: Arc<dyn NotificationRepo>,
    pub build_repo: Arc<dyn BuildRepo>,
    pub engine: Arc<dyn LaneEngine>,
    pub hosting: Arc<dyn RemoteHosting>,
    pub worker: Arc<WorkerService>,
}

impl Services {
    pub fn new(
        settings: Settings,
        store: VersionedStore,
        engine: Arc<dyn LaneEngine>,
        checkout: Arc<dyn SourceCheckout>,
        hosting: Arc<dyn RemoteHosting>,
    ) -> Self {
        let cipher = settings
            .encryption_key
            .as_deref()
            .map(SecretCipher::from_passphrase);
        let user_repo: Arc<dyn UserRepo> = Arc::new(JsonUserRepo::new(store.clone(), cipher));
        let project_repo: Arc<dyn ProjectRepo> = Arc::new(JsonProjectRepo::new(store.clone()));
        let notification_repo: Arc<dyn NotificationRepo> =
            Arc::new(JsonNotificationRepo::new(store.clone()));
        let build_repo: Arc<dyn BuildRepo> = Arc::new(JsonBuildRepo::new(store.clone()));

        let worker = Arc::new(WorkerService::new(
            build_repo.clone(),
            user_repo.clone(),
            checkout,
            settings.ci_user.email.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            store,
            user_repo,
            project_repo,
            notification_repo,
            build_repo,
            engine,
            hosting,
            worker,
        }
    }

    /// Production wiring: git checkouts, the configured lane engine and GitHub.
    pub fn from_settings(settings: Settings) -> Self {
        let mut store = VersionedStore::new(
            settings.config_repo.path.clone(),
            settings.config_repo.branch.clone(),
            CommitIdentity::new(
                settings.committer.name.clone(),
                settings.committer.email.clone(),
            ),
        );
        if let Some(token) = &settings.clone_token {
            let owner = settings.ci_user.email.clone().unwrap_or_default();
            store = store.with_credential(GitHubCredential::new(owner, token.clone()).into());
        }

        let engine = Arc::new(CommandLaneEngine::from_settings(&settings.engine));
        let checkout = Arc::new(GitCheckout::new(settings.work_dir.clone()));
        let hosting = Arc::new(GitHubHosting::new(
            settings.github_api.clone(),
            settings.clone_token.clone().unwrap_or_default(),
        ));

        Self::new(settings, store, engine, checkout, hosting)
    }

    pub fn builds(&self) -> BuildService {
        BuildService::new(
            self.project_repo.clone(),
            self.build_repo.clone(),
            self.engine.clone(),
            self.worker.clone(),
        )
    }

    pub fn projects(&self) -> ProjectService {
        ProjectService::new(self.project_repo.clone())
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.user_repo.clone(), self.settings.ci_user.email.clone())
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.notification_repo.clone())
    }

    pub fn onboarding(&self) -> OnboardingService {
        OnboardingService::new(
            self.settings.clone(),
            self.store.clone(),
            self.hosting.clone(),
            self.user_repo.clone(),
            self.project_repo.clone(),
        )
    }
}
