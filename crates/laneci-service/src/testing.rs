//! Fakes and fixtures shared by the service tests.

use async_trait::async_trait;
use laneci_config::Settings;
use laneci_core::{
    Artifact, EngineError, HostingError, LaneEngine, LaneInvocation, OutputEvent, OutputSink,
    Project, ProviderCredential, RemoteHosting, RepoConfig, RepoHandle, RowType,
};
use laneci_store::{CommitIdentity, VersionedStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;
use url::Url;

use crate::{CheckoutError, LocalWorkspace, Services, SourceCheckout, Workspace};

pub const CI_USER: &str = "ci@acme.dev";

pub fn project(name: &str, lane: &str) -> Project {
    let url = Url::parse(&format!("https://github.com/acme/{}.git", name)).unwrap();
    Project::new(name, RepoConfig::new(url, format!("acme/{}", name)), lane)
}

/// Emits a fixed list of rows on every run.
pub struct ScriptedEngine {
    events: Vec<(RowType, &'static str)>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(events: Vec<(RowType, &'static str)>) -> Arc<Self> {
        Arc::new(Self {
            events,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LaneEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(
        &self,
        _invocation: &LaneInvocation,
        sink: &dyn OutputSink,
    ) -> Result<Vec<Artifact>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (row_type, message) in &self.events {
            sink.emit(OutputEvent::new(row_type.clone(), *message));
        }
        Ok(Vec::new())
    }
}

/// Holds the run until [`GatedEngine::release`] is called.
pub struct GatedEngine {
    events: Vec<(RowType, &'static str)>,
    gate: Notify,
}

impl GatedEngine {
    pub fn new(events: Vec<(RowType, &'static str)>) -> Arc<Self> {
        Arc::new(Self {
            events,
            gate: Notify::new(),
        })
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl LaneEngine for GatedEngine {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn execute(
        &self,
        _invocation: &LaneInvocation,
        sink: &dyn OutputSink,
    ) -> Result<Vec<Artifact>, EngineError> {
        self.gate.notified().await;
        for (row_type, message) in &self.events {
            sink.emit(OutputEvent::new(row_type.clone(), *message));
        }
        Ok(Vec::new())
    }
}

pub struct FailingCheckout;

#[async_trait]
impl SourceCheckout for FailingCheckout {
    async fn prepare(
        &self,
        _project: &Project,
        _credential: Option<&ProviderCredential>,
    ) -> Result<Workspace, CheckoutError> {
        Err(CheckoutError::CloneFailed("repository not found".to_string()))
    }
}

/// Records every repository it is asked to create.
#[derive(Default)]
pub struct RecordingHosting {
    pub created: Mutex<Vec<(String, bool)>>,
}

#[async_trait]
impl RemoteHosting for RecordingHosting {
    async fn create_repository(
        &self,
        name: &str,
        private: bool,
    ) -> Result<RepoHandle, HostingError> {
        self.created
            .lock()
            .unwrap()
            .push((name.to_string(), private));
        Ok(RepoHandle {
            full_name: format!("acme/{}", name),
            clone_url: format!("https://github.com/acme/{}.git", name),
            html_url: format!("https://github.com/acme/{}", name),
            private,
        })
    }
}

/// Services over an initialized store in a temporary directory.
pub struct TestEnv {
    _dir: TempDir,
    pub store: VersionedStore,
    pub hosting: Arc<RecordingHosting>,
    pub services: Services,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_engine(ScriptedEngine::new(Vec::new()))
    }

    pub fn with_engine(engine: Arc<dyn LaneEngine>) -> Self {
        Self::create(Self::settings(), engine, None, true)
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::create(settings, ScriptedEngine::new(Vec::new()), None, true)
    }

    pub fn build(engine: Arc<dyn LaneEngine>, checkout: Arc<dyn SourceCheckout>) -> Self {
        Self::create(Self::settings(), engine, Some(checkout), true)
    }

    /// Like [`TestEnv::with_settings`], but the working copy does not exist yet.
    pub fn uninitialized(settings: Settings) -> Self {
        Self::create(settings, ScriptedEngine::new(Vec::new()), None, false)
    }

    pub fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.ci_user.email = Some(CI_USER.to_string());
        settings.encryption_key = Some("laneci-test-key".to_string());
        settings
    }

    fn create(
        mut settings: Settings,
        engine: Arc<dyn LaneEngine>,
        checkout: Option<Arc<dyn SourceCheckout>>,
        initialize: bool,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        settings.config_repo.path = dir.path().join("config");
        settings.work_dir = dir.path().join("workspaces");

        let store = VersionedStore::new(
            settings.config_repo.path.clone(),
            settings.config_repo.branch.clone(),
            CommitIdentity::new("laneci-test", "test@laneci.dev"),
        );
        if initialize {
            store.init().unwrap();
        }

        let checkout: Arc<dyn SourceCheckout> = match checkout {
            Some(checkout) => checkout,
            None => Arc::new(LocalWorkspace::new(dir.path().join("workspace"))),
        };
        let hosting = Arc::new(RecordingHosting::default());
        let services = Services::new(settings, store.clone(), engine, checkout, hosting.clone());

        Self {
            _dir: dir,
            store,
            hosting,
            services,
        }
    }
}
