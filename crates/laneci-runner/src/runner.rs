//! Build runner.
//!
//! A [`BuildRunner`] drives one build record through
//! `pending -> running -> success | failure`. Output reported by the lane engine
//! flows through an [`OutputPublisher`] to four subscribers, registered in this
//! order: the sticky success flag, the transcript, the row collector and the
//! caller's row callback.

use futures::FutureExt;
use laneci_config::LaneSpec;
use laneci_core::{
    Artifact, BuildError, BuildParameters, BuildRecord, BuildRunnerOutputRow, BuildStatus,
    LaneEngine, LaneInvocation, OutputEvent, OutputSink, Project,
};
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info};

use crate::{OutputPublisher, RunnerError, RunnerResult};

pub struct BuildRunner {
    project: Project,
    build: BuildRecord,
    engine: Arc<dyn LaneEngine>,
    workspace: Option<PathBuf>,
    configured: bool,
}

impl BuildRunner {
    pub fn new(project: Project, build: BuildRecord, engine: Arc<dyn LaneEngine>) -> Self {
        Self {
            project,
            build,
            engine,
            workspace: None,
            configured: false,
        }
    }

    /// Split the project lane into platform and lane and store them with the
    /// parameters on the build record.
    pub fn setup(&mut self, parameters: BuildParameters) -> RunnerResult<()> {
        let spec = LaneSpec::parse(&self.project.lane)?;
        self.build.platform = spec.platform;
        self.build.lane = spec.lane;
        self.build.parameters = parameters;
        self.configured = true;
        Ok(())
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn build(&self) -> &BuildRecord {
        &self.build
    }

    /// Adopt the sequence number the record was persisted with.
    pub fn set_number(&mut self, number: u64) {
        self.build.number = number;
    }

    /// Directory the lane runs in.
    pub fn set_workspace(&mut self, workspace: impl Into<PathBuf>) {
        self.workspace = Some(workspace.into());
    }

    /// Run the lane and return the terminal record.
    ///
    /// `on_row` sees every row in emission order and is never called after
    /// `completion`. `completion` is called exactly once with the artifacts,
    /// which are empty when the engine failed.
    pub async fn run<R, C>(self, on_row: R, completion: C) -> RunnerResult<BuildRecord>
    where
        R: FnMut(&BuildRunnerOutputRow) + Send + 'static,
        C: FnOnce(&[Artifact]) + Send,
    {
        let Self {
            project,
            mut build,
            engine,
            workspace,
            configured,
        } = self;

        if !configured {
            return Err(RunnerError::NotConfigured("setup was not called"));
        }
        let workspace = workspace.ok_or(RunnerError::NotConfigured("no workspace"))?;

        let publisher = Arc::new(OutputPublisher::new());
        let succeeded = Arc::new(AtomicBool::new(true));
        let transcript = Arc::new(Mutex::new(vec![format!(
            "{}, {} platform: {} params: {:?}",
            workspace.display(),
            build.lane,
            build.platform.as_deref().unwrap_or("-"),
            build.parameters
        )]));
        let rows = Arc::new(Mutex::new(Vec::new()));

        {
            let succeeded = succeeded.clone();
            publisher.subscribe(move |row| {
                if row.did_fail_build() {
                    succeeded.store(false, Ordering::SeqCst);
                }
            });
        }
        {
            let transcript = transcript.clone();
            publisher.subscribe(move |row| {
                lock(&transcript).push(row.transcript_line());
            });
        }
        {
            let rows = rows.clone();
            publisher.subscribe(move |row| lock(&rows).push(row.clone()));
        }
        publisher.subscribe(on_row);

        build.mark_running()?;
        info!(
            project = %project.project_name,
            build_id = %build.id,
            number = build.number,
            engine = engine.name(),
            lane = %build.lane,
            platform = build.platform.as_deref().unwrap_or(""),
            "Build started"
        );

        let invocation = LaneInvocation {
            workspace,
            platform: build.platform.clone(),
            lane: build.lane.clone(),
            parameters: build.parameters.clone(),
        };
        let sink = PublishingSink {
            publisher: publisher.clone(),
        };

        let outcome = AssertUnwindSafe(engine.execute(&invocation, &sink))
            .catch_unwind()
            .await;
        publisher.close();

        let (artifacts, failure) = match outcome {
            Ok(Ok(artifacts)) => (artifacts, None),
            Ok(Err(e)) => {
                let context = error_chain(&e);
                error!(build_id = %build.id, error = %e, ?context, "Lane engine failed");
                (
                    Vec::new(),
                    Some(BuildError {
                        message: e.to_string(),
                        context,
                    }),
                )
            }
            Err(payload) => {
                let message = format!("lane engine panicked: {}", panic_message(payload.as_ref()));
                let backtrace = Backtrace::force_capture().to_string();
                error!(build_id = %build.id, %message, %backtrace, "Lane engine panicked");
                (
                    Vec::new(),
                    Some(BuildError {
                        message,
                        context: backtrace.lines().map(str::to_string).collect(),
                    }),
                )
            }
        };

        let status = if failure.is_none() && succeeded.load(Ordering::SeqCst) {
            BuildStatus::Success
        } else {
            BuildStatus::Failure
        };

        build.rows = std::mem::take(&mut *lock(&rows));
        build.artifacts = artifacts;
        build.error = failure;
        build.finish(status)?;

        debug!(
            build_id = %build.id,
            transcript = %lock(&transcript).join("\n"),
            "Build transcript"
        );
        info!(
            project = %project.project_name,
            build_id = %build.id,
            %status,
            rows = build.rows.len(),
            artifacts = build.artifacts.len(),
            "Build finished"
        );

        completion(&build.artifacts);
        Ok(build)
    }
}

/// Converts engine events into rows and hands them to the publisher.
struct PublishingSink {
    publisher: Arc<OutputPublisher>,
}

impl OutputSink for PublishingSink {
    fn emit(&self, event: OutputEvent) {
        self.publisher
            .publish(&BuildRunnerOutputRow::from_event(event));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn error_chain(err: &dyn std::error::Error) -> Vec<String> {
    let mut chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use laneci_config::ConfigError;
    use laneci_core::{EngineError, RepoConfig, RowType};
    use url::Url;

    enum Outcome {
        Artifacts(Vec<Artifact>),
        Fail,
        Panic,
    }

    /// Emits a fixed list of events, then finishes with the scripted outcome.
    struct ScriptedEngine {
        events: Vec<(RowType, &'static str)>,
        outcome: Outcome,
        invocation: Mutex<Option<LaneInvocation>>,
    }

    impl ScriptedEngine {
        fn new(events: Vec<(RowType, &'static str)>, outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                events,
                outcome,
                invocation: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LaneEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn execute(
            &self,
            invocation: &LaneInvocation,
            sink: &dyn OutputSink,
        ) -> Result<Vec<Artifact>, EngineError> {
            *self.invocation.lock().unwrap() = Some(invocation.clone());
            for (row_type, message) in &self.events {
                sink.emit(OutputEvent::new(row_type.clone(), *message));
            }
            match &self.outcome {
                Outcome::Artifacts(artifacts) => Ok(artifacts.clone()),
                Outcome::Fail => Err(EngineError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "fastlane: command not found",
                ))),
                Outcome::Panic => panic!("engine exploded"),
            }
        }
    }

    fn project(lane: &str) -> Project {
        let repo = RepoConfig::new(
            Url::parse("https://github.com/acme/ios-app.git").unwrap(),
            "acme/ios-app",
        );
        Project::new("ios-app", repo, lane)
    }

    fn runner(lane: &str, engine: Arc<ScriptedEngine>) -> BuildRunner {
        let project = project(lane);
        let build = BuildRecord::pending(project.id);
        let mut runner = BuildRunner::new(project, build, engine);
        runner.set_workspace(std::env::temp_dir());
        runner
    }

    #[derive(Default)]
    struct Calls {
        log: Mutex<Vec<String>>,
        artifacts: Mutex<Vec<Vec<Artifact>>>,
    }

    async fn run_recorded(runner: BuildRunner, calls: &Arc<Calls>) -> RunnerResult<BuildRecord> {
        let on_row_calls = calls.clone();
        let completion_calls = calls.clone();
        runner
            .run(
                move |row| {
                    on_row_calls
                        .log
                        .lock()
                        .unwrap()
                        .push(format!("row:{}", row.message));
                },
                move |artifacts| {
                    completion_calls.log.lock().unwrap().push("done".to_string());
                    completion_calls
                        .artifacts
                        .lock()
                        .unwrap()
                        .push(artifacts.to_vec());
                },
            )
            .await
    }

    #[tokio::test]
    async fn test_ios_beta_succeeds() {
        let engine = ScriptedEngine::new(
            vec![
                (RowType::Header, "Driving the lane 'ios beta'"),
                (RowType::Success, "fastlane.tools finished successfully"),
            ],
            Outcome::Artifacts(vec![Artifact::new("ipa", "build/App.ipa")]),
        );
        let mut runner = runner("ios beta", engine.clone());
        let parameters = BuildParameters::from([("scheme".to_string(), "App".to_string())]);
        runner.setup(parameters.clone()).unwrap();
        assert_eq!(runner.build().platform.as_deref(), Some("ios"));
        assert_eq!(runner.build().lane, "beta");

        let calls = Arc::new(Calls::default());
        let build = run_recorded(runner, &calls).await.unwrap();

        assert_eq!(build.status, BuildStatus::Success);
        assert_eq!(build.rows.len(), 2);
        assert!(build.rows[0].html.starts_with(r#"<h4 class="header">"#));
        assert_eq!(build.artifacts, vec![Artifact::new("ipa", "build/App.ipa")]);
        assert!(build.error.is_none());
        assert!(build.started_at.is_some() && build.ended_at.is_some());

        let invocation = engine.invocation.lock().unwrap().clone().unwrap();
        assert_eq!(invocation.platform.as_deref(), Some("ios"));
        assert_eq!(invocation.lane, "beta");
        assert_eq!(invocation.parameters, parameters);

        assert_eq!(calls.artifacts.lock().unwrap().len(), 1);
        assert_eq!(
            *calls.log.lock().unwrap(),
            vec![
                "row:Driving the lane 'ios beta'",
                "row:fastlane.tools finished successfully",
                "done"
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_row_is_sticky() {
        let engine = ScriptedEngine::new(
            vec![
                (RowType::Crash, "Lane crashed"),
                (RowType::Success, "Cleanup finished"),
            ],
            Outcome::Artifacts(Vec::new()),
        );
        let mut runner = runner("test", engine);
        runner.setup(BuildParameters::new()).unwrap();

        let calls = Arc::new(Calls::default());
        let build = run_recorded(runner, &calls).await.unwrap();

        assert_eq!(build.status, BuildStatus::Failure);
        assert_eq!(build.platform, None);
        assert!(build.error.is_none());
        assert!(build.rows[0].did_fail_build());
        assert_eq!(build.rows[0].html, r#"<p class="failure">Lane crashed</p>"#);
        assert_eq!(calls.log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_error_row_fails_build() {
        let engine = ScriptedEngine::new(
            vec![
                (RowType::Message, "Compiling"),
                (RowType::Error, "Lane crashed"),
                (RowType::Message, "Uploading logs"),
            ],
            Outcome::Artifacts(Vec::new()),
        );
        let mut runner = runner("ios beta", engine);
        runner.setup(BuildParameters::new()).unwrap();

        let calls = Arc::new(Calls::default());
        let build = run_recorded(runner, &calls).await.unwrap();

        assert_eq!(build.status, BuildStatus::Failure);
        assert!(build.ended_at.is_some());
        assert!(!build.rows[0].did_fail_build());
        assert!(build.rows[1].did_fail_build());
        assert_eq!(build.rows[1].html, r#"<p class="error">Lane crashed</p>"#);
        assert_eq!(build.rows.len(), 3);
    }

    #[tokio::test]
    async fn test_engine_error_still_completes() {
        let engine = ScriptedEngine::new(vec![(RowType::Message, "starting")], Outcome::Fail);
        let mut runner = runner("ios beta", engine);
        runner.setup(BuildParameters::new()).unwrap();

        let calls = Arc::new(Calls::default());
        let build = run_recorded(runner, &calls).await.unwrap();

        assert_eq!(build.status, BuildStatus::Failure);
        let error = build.error.unwrap();
        assert!(error.message.contains("failed to start lane engine"));
        assert_eq!(error.context, vec!["fastlane: command not found"]);
        assert_eq!(*calls.artifacts.lock().unwrap(), vec![Vec::<Artifact>::new()]);
        assert_eq!(calls.log.lock().unwrap().last().unwrap(), "done");
    }

    #[tokio::test]
    async fn test_engine_panic_is_contained() {
        let engine = ScriptedEngine::new(Vec::new(), Outcome::Panic);
        let mut runner = runner("ios beta", engine);
        runner.setup(BuildParameters::new()).unwrap();

        let calls = Arc::new(Calls::default());
        let build = run_recorded(runner, &calls).await.unwrap();

        assert_eq!(build.status, BuildStatus::Failure);
        let error = build.error.unwrap();
        assert!(error.message.contains("engine exploded"));
        assert!(!error.context.is_empty());
        assert_eq!(*calls.log.lock().unwrap(), vec!["done"]);
    }

    #[tokio::test]
    async fn test_run_requires_setup() {
        let engine = ScriptedEngine::new(Vec::new(), Outcome::Artifacts(Vec::new()));
        let runner = runner("ios beta", engine.clone());

        let calls = Arc::new(Calls::default());
        let result = run_recorded(runner, &calls).await;

        assert!(matches!(result, Err(RunnerError::NotConfigured(_))));
        assert!(engine.invocation.lock().unwrap().is_none());
        assert!(calls.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_lane_is_rejected() {
        let engine = ScriptedEngine::new(Vec::new(), Outcome::Artifacts(Vec::new()));
        let mut runner = runner("   ", engine);

        let result = runner.setup(BuildParameters::new());
        assert!(matches!(
            result,
            Err(RunnerError::Config(ConfigError::EmptyLane))
        ));
    }

    #[tokio::test]
    async fn test_record_must_be_pending() {
        let engine = ScriptedEngine::new(Vec::new(), Outcome::Artifacts(Vec::new()));
        let project = project("ios beta");
        let mut build = BuildRecord::pending(project.id);
        build.mark_running().unwrap();
        let mut runner = BuildRunner::new(project, build, engine.clone());
        runner.set_workspace(std::env::temp_dir());
        runner.setup(BuildParameters::new()).unwrap();

        let calls = Arc::new(Calls::default());
        let result = run_recorded(runner, &calls).await;

        assert!(matches!(result, Err(RunnerError::Transition(_))));
        assert!(engine.invocation.lock().unwrap().is_none());
    }
}
