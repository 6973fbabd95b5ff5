//! Subprocess lane engine.

use async_trait::async_trait;
use laneci_config::EngineSettings;
use laneci_core::{
    Artifact, EngineError, LaneEngine, LaneInvocation, OutputEvent, OutputSink, RowType,
};
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

/// Runs `<program> [args..] [platform] <lane> key:value..` in the workspace.
///
/// stdout lines become `message` rows and stderr lines `important` rows, in the
/// order they arrive.
pub struct CommandLaneEngine {
    program: String,
    args: Vec<String>,
}

impl CommandLaneEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.clone())
    }

    fn command_args(&self, invocation: &LaneInvocation) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(platform) = &invocation.platform {
            args.extend(platform.split_whitespace().map(str::to_string));
        }
        args.push(invocation.lane.clone());
        args.extend(
            invocation
                .parameters
                .iter()
                .map(|(key, value)| format!("{}:{}", key, value)),
        );
        args
    }
}

#[async_trait]
impl LaneEngine for CommandLaneEngine {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn execute(
        &self,
        invocation: &LaneInvocation,
        sink: &dyn OutputSink,
    ) -> Result<Vec<Artifact>, EngineError> {
        let args = self.command_args(invocation);
        let command_line = std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        info!(dir = %invocation.workspace.display(), command = %command_line, "Running lane");
        sink.emit(OutputEvent::new(RowType::Command, command_line));

        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(&invocation.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Io(std::io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Io(std::io::Error::other("stderr was not captured")))?;

        let mut stdout_reader = BufReader::new(stdout);
        let mut stderr_reader = BufReader::new(stderr);
        let mut stdout_line = Vec::new();
        let mut stderr_line = Vec::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        // Lines are read as bytes: lanes print whatever their tools print, and a
        // pipe that stops being drained blocks the child forever.
        while !(stdout_done && stderr_done) {
            tokio::select! {
                read = stdout_reader.read_until(b'\n', &mut stdout_line), if !stdout_done => {
                    stdout_done = drain_line(read, &mut stdout_line, "stdout", |line| {
                        sink.emit(OutputEvent::new(RowType::Message, line))
                    });
                }
                read = stderr_reader.read_until(b'\n', &mut stderr_line), if !stderr_done => {
                    stderr_done = drain_line(read, &mut stderr_line, "stderr", |line| {
                        sink.emit(OutputEvent::new(RowType::Important, line))
                    });
                }
            }
        }

        let status = child.wait().await?;
        if status.success() {
            sink.emit(OutputEvent::new(
                RowType::Success,
                format!("Lane {} finished successfully", invocation.lane),
            ));
            Ok(Vec::new())
        } else {
            let message = format!("{} exited with {}", self.program, status);
            sink.emit(OutputEvent::new(RowType::ShellError, message.clone()));
            Err(EngineError::LaneFailed(message))
        }
    }
}

/// Hand one complete line to `emit` and clear the buffer. Returns whether the
/// stream is finished.
fn drain_line(
    read: std::io::Result<usize>,
    line: &mut Vec<u8>,
    stream: &str,
    emit: impl FnOnce(String),
) -> bool {
    match read {
        Ok(0) => true,
        Ok(_) => {
            emit(decode_line(line));
            line.clear();
            false
        }
        Err(e) if e.kind() == ErrorKind::Interrupted => false,
        Err(e) => {
            warn!(stream, error = %e, "Error reading lane output");
            if !line.is_empty() {
                emit(decode_line(line));
                line.clear();
            }
            true
        }
    }
}

/// Strip the line terminator and replace invalid UTF-8.
fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use laneci_core::BuildParameters;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<OutputEvent>>,
    }

    impl OutputSink for CollectingSink {
        fn emit(&self, event: OutputEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl CollectingSink {
        fn of_type(&self, row_type: RowType) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.row_type == row_type)
                .map(|e| e.message.clone())
                .collect()
        }
    }

    fn invocation(dir: &std::path::Path, platform: Option<&str>, lane: &str) -> LaneInvocation {
        LaneInvocation {
            workspace: dir.to_path_buf(),
            platform: platform.map(str::to_string),
            lane: lane.to_string(),
            parameters: BuildParameters::from([("scheme".to_string(), "App".to_string())]),
        }
    }

    /// `sh -c <script> sh <lane args..>` exposes the lane arguments as `$@`.
    fn shell(script: &str) -> CommandLaneEngine {
        CommandLaneEngine::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        )
    }

    #[test]
    fn test_command_args() {
        let engine = CommandLaneEngine::new("fastlane", vec!["--verbose".to_string()]);
        let args = engine.command_args(&invocation(std::path::Path::new("."), Some("ios"), "beta"));
        assert_eq!(args, vec!["--verbose", "ios", "beta", "scheme:App"]);

        let args = engine.command_args(&invocation(std::path::Path::new("."), None, "test"));
        assert_eq!(args, vec!["--verbose", "test", "scheme:App"]);
    }

    #[tokio::test]
    async fn test_streams_output_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = shell(r#"echo "lane $1 $2"; echo one; echo warn >&2; echo two"#);
        let sink = CollectingSink::default();

        let artifacts = engine
            .execute(&invocation(dir.path(), Some("ios"), "beta"), &sink)
            .await
            .unwrap();

        assert!(artifacts.is_empty());
        assert_eq!(sink.of_type(RowType::Message), vec!["lane ios beta", "one", "two"]);
        assert_eq!(sink.of_type(RowType::Important), vec!["warn"]);
        assert_eq!(sink.of_type(RowType::Command).len(), 1);
        assert_eq!(sink.of_type(RowType::Success), vec!["Lane beta finished successfully"]);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.first().unwrap().row_type, RowType::Command);
        assert_eq!(events.last().unwrap().row_type, RowType::Success);
    }

    #[tokio::test]
    async fn test_runs_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Fastfile"), "lane :beta").unwrap();
        let engine = shell("cat Fastfile");
        let sink = CollectingSink::default();

        engine
            .execute(&invocation(dir.path(), None, "beta"), &sink)
            .await
            .unwrap();
        assert_eq!(sink.of_type(RowType::Message), vec!["lane :beta"]);
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_lane() {
        let dir = tempfile::tempdir().unwrap();
        let engine = shell("echo building; exit 3");
        let sink = CollectingSink::default();

        let result = engine
            .execute(&invocation(dir.path(), None, "beta"), &sink)
            .await;

        assert!(matches!(result, Err(EngineError::LaneFailed(_))));
        assert_eq!(sink.of_type(RowType::ShellError).len(), 1);
        assert!(sink.of_type(RowType::Success).is_empty());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CommandLaneEngine::new("laneci-no-such-program", Vec::new());
        let sink = CollectingSink::default();

        let result = engine
            .execute(&invocation(dir.path(), None, "beta"), &sink)
            .await;
        assert!(matches!(result, Err(EngineError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = shell(r"printf 'before\n\377\376bad\nafter1\r\nafter2\n'; printf 'tail'");
        let sink = CollectingSink::default();

        engine
            .execute(&invocation(dir.path(), None, "beta"), &sink)
            .await
            .unwrap();
        assert_eq!(
            sink.of_type(RowType::Message),
            vec!["before", "\u{FFFD}\u{FFFD}bad", "after1", "after2", "tail"]
        );
    }

    #[tokio::test]
    async fn test_large_output_after_invalid_bytes_completes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = shell(
            r#"printf '\377\n'; printf '\376\n' >&2
i=0
while [ $i -lt 20000 ]; do
  echo "line $i of build output padded to fill the pipe buffer"
  echo "warning $i" >&2
  i=$((i+1))
done"#,
        );
        let sink = CollectingSink::default();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(60),
            engine.execute(&invocation(dir.path(), None, "beta"), &sink),
        )
        .await
        .expect("lane output was not drained");

        assert!(result.is_ok());
        let messages = sink.of_type(RowType::Message);
        assert_eq!(messages.len(), 20001);
        assert_eq!(messages.last().unwrap(), "line 19999 of build output padded to fill the pipe buffer");
        assert_eq!(sink.of_type(RowType::Important).len(), 20001);
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"\xffx\n"), "\u{FFFD}x");
    }
}
