//! Build output rows.
//!
//! A lane engine emits raw `{type, message, time}` events. Each one becomes a
//! [`BuildRunnerOutputRow`] carrying a rendered HTML form for the dashboard.
//! Rendering only looks at `(type, message)`, so the same pair always renders
//! to the same markup.

use askama::Template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::OutputEvent;

/// Kind of a row, as reported by the lane engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RowType {
    Success,
    Message,
    Important,
    Error,
    Header,
    Command,
    CommandOutput,
    Verbose,
    Deprecated,
    Crash,
    UserError,
    ShellError,
    BuildFailure,
    TestFailure,
    Abort,
    /// Any type this version does not know about. Kept verbatim.
    Other(String),
}

impl RowType {
    pub fn as_str(&self) -> &str {
        match self {
            RowType::Success => "success",
            RowType::Message => "message",
            RowType::Important => "important",
            RowType::Error => "error",
            RowType::Header => "header",
            RowType::Command => "command",
            RowType::CommandOutput => "command_output",
            RowType::Verbose => "verbose",
            RowType::Deprecated => "deprecated",
            RowType::Crash => "crash",
            RowType::UserError => "user_error",
            RowType::ShellError => "shell_error",
            RowType::BuildFailure => "build_failure",
            RowType::TestFailure => "test_failure",
            RowType::Abort => "abort",
            RowType::Other(other) => other,
        }
    }

    /// Whether a row of this type means the lane failed.
    pub fn signals_failure(&self) -> bool {
        matches!(
            self,
            RowType::Error
                | RowType::Crash
                | RowType::UserError
                | RowType::ShellError
                | RowType::BuildFailure
                | RowType::TestFailure
                | RowType::Abort
        )
    }
}

impl From<String> for RowType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "success" => RowType::Success,
            "message" => RowType::Message,
            "important" => RowType::Important,
            "error" => RowType::Error,
            "header" => RowType::Header,
            "command" => RowType::Command,
            "command_output" => RowType::CommandOutput,
            "verbose" => RowType::Verbose,
            "deprecated" => RowType::Deprecated,
            "crash" => RowType::Crash,
            "user_error" => RowType::UserError,
            "shell_error" => RowType::ShellError,
            "build_failure" => RowType::BuildFailure,
            "test_failure" => RowType::TestFailure,
            "abort" => RowType::Abort,
            _ => RowType::Other(value),
        }
    }
}

impl From<&str> for RowType {
    fn from(value: &str) -> Self {
        RowType::from(value.to_string())
    }
}

impl From<RowType> for String {
    fn from(value: RowType) -> Self {
        match value {
            RowType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized line of build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRunnerOutputRow {
    #[serde(rename = "type")]
    pub row_type: RowType,
    pub message: String,
    pub time: DateTime<Utc>,
    pub html: String,
}

impl BuildRunnerOutputRow {
    pub fn new(row_type: RowType, message: impl Into<String>, time: DateTime<Utc>) -> Self {
        let message = message.into();
        let html = render_row(&row_type, &message);
        Self {
            row_type,
            message,
            time,
            html,
        }
    }

    pub fn from_event(event: OutputEvent) -> Self {
        Self::new(event.row_type, event.message, event.time)
    }

    pub fn did_fail_build(&self) -> bool {
        self.row_type.signals_failure()
    }

    /// `"<time>: <message>"`, the form used in run transcripts.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.time.to_rfc3339(), self.message)
    }
}

#[derive(Template)]
#[template(source = r#"<p class="{{ class }}">{{ message }}</p>"#, ext = "html")]
struct ParagraphRow<'a> {
    class: &'a str,
    message: &'a str,
}

#[derive(Template)]
#[template(source = r#"<h4 class="header">{{ message }}</h4>"#, ext = "html")]
struct HeaderRow<'a> {
    message: &'a str,
}

#[derive(Template)]
#[template(source = r#"<p class="command">$ {{ message }}</p>"#, ext = "html")]
struct CommandRow<'a> {
    message: &'a str,
}

#[derive(Template)]
#[template(source = r#"<pre class="command-output">{{ message }}</pre>"#, ext = "html")]
struct CommandOutputRow<'a> {
    message: &'a str,
}

/// Render a row to HTML. Total: unknown types get the neutral `message` style.
pub fn render_row(row_type: &RowType, message: &str) -> String {
    let rendered = match row_type {
        RowType::Header => HeaderRow { message }.render(),
        RowType::Command => CommandRow { message }.render(),
        RowType::CommandOutput => CommandOutputRow { message }.render(),
        other => ParagraphRow {
            class: paragraph_class(other),
            message,
        }
        .render(),
    };
    // Formatting plain strings into a String cannot fail.
    rendered.unwrap_or_default()
}

fn paragraph_class(row_type: &RowType) -> &'static str {
    match row_type {
        RowType::Success => "success",
        RowType::Important => "important",
        RowType::Verbose => "verbose",
        RowType::Deprecated => "deprecated",
        RowType::Error => "error",
        RowType::Crash
        | RowType::UserError
        | RowType::ShellError
        | RowType::BuildFailure
        | RowType::TestFailure
        | RowType::Abort => "failure",
        RowType::Message
        | RowType::Header
        | RowType::Command
        | RowType::CommandOutput
        | RowType::Other(_) => "message",
    }
}
