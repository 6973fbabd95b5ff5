//! Lane engine contract.
//!
//! The engine that actually runs a lane is an external collaborator. laneci hands
//! it a [`LaneInvocation`] and an [`OutputSink`]; the engine reports every line of
//! output through the sink, in order, and returns the artifacts it produced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::output::RowType;
use crate::{Artifact, BuildParameters};

/// A raw output event, before conversion into a build row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    #[serde(rename = "type")]
    pub row_type: RowType,
    pub message: String,
    pub time: DateTime<Utc>,
}

impl OutputEvent {
    pub fn new(row_type: RowType, message: impl Into<String>) -> Self {
        Self {
            row_type,
            message: message.into(),
            time: Utc::now(),
        }
    }
}

/// Receiver of engine output. Calls arrive in emission order.
pub trait OutputSink: Send + Sync {
    fn emit(&self, event: OutputEvent);
}

/// Everything an engine needs to run one lane.
#[derive(Debug, Clone)]
pub struct LaneInvocation {
    /// Checkout of the project repository.
    pub workspace: PathBuf,
    pub platform: Option<String>,
    pub lane: String,
    pub parameters: BuildParameters,
}

/// A lane failed in a way the engine could not report as output.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start lane engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("lane failed: {0}")]
    LaneFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs lanes.
#[async_trait]
pub trait LaneEngine: Send + Sync {
    /// Name of this engine.
    fn name(&self) -> &'static str;

    /// Run a lane to completion, reporting output through `sink`.
    async fn execute(
        &self,
        invocation: &LaneInvocation,
        sink: &dyn OutputSink,
    ) -> Result<Vec<Artifact>, EngineError>;
}
