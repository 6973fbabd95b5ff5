//! Build records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::output::BuildRunnerOutputRow;
use crate::{Artifact, Entity, Error, ResourceId, Result};

/// Parameters passed to a lane, kept sorted so the persisted JSON is stable.
pub type BuildParameters = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failure)
    }

    fn can_transition_to(self, next: BuildStatus) -> bool {
        matches!(
            (self, next),
            (BuildStatus::Pending, BuildStatus::Running)
                | (BuildStatus::Running, BuildStatus::Success)
                | (BuildStatus::Running, BuildStatus::Failure)
        )
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// Why a build ended in `failure` without the lane reporting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildError {
    pub message: String,
    /// Error source chain or panic backtrace, one entry per line.
    #[serde(default)]
    pub context: Vec<String>,
}

/// One execution attempt of a project's lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: ResourceId,
    pub project_id: ResourceId,
    /// Per-project sequence number, starting at 1.
    pub number: u64,
    pub status: BuildStatus,
    pub platform: Option<String>,
    pub lane: String,
    #[serde(default)]
    pub parameters: BuildParameters,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rows: Vec<BuildRunnerOutputRow>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub error: Option<BuildError>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BuildRecord {
    /// A new `pending` build. The number is assigned when the record is persisted.
    pub fn pending(project_id: ResourceId) -> Self {
        Self {
            id: ResourceId::new(),
            project_id,
            number: 0,
            status: BuildStatus::Pending,
            platform: None,
            lane: String::new(),
            parameters: BuildParameters::new(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            rows: Vec::new(),
            artifacts: Vec::new(),
            error: None,
            updated_at: None,
        }
    }

    /// `pending -> running`.
    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(BuildStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> success | failure`.
    pub fn finish(&mut self, status: BuildStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.transition(status)?;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: BuildStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

impl Entity for BuildRecord {
    const KIND: &'static str = "build";

    fn id(&self) -> ResourceId {
        self.id
    }

    fn primary_key(&self) -> String {
        self.id.to_string()
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut build = BuildRecord::pending(ResourceId::new());
        assert_eq!(build.status, BuildStatus::Pending);

        build.mark_running().unwrap();
        assert_eq!(build.status, BuildStatus::Running);
        assert!(build.started_at.is_some());

        build.finish(BuildStatus::Success).unwrap();
        assert!(build.is_finished());
        assert!(build.ended_at.is_some());
    }

    #[test]
    fn test_cannot_skip_running() {
        let mut build = BuildRecord::pending(ResourceId::new());
        let err = build.finish(BuildStatus::Failure).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: BuildStatus::Pending,
                to: BuildStatus::Failure
            }
        ));
    }

    #[test]
    fn test_terminal_is_final() {
        let mut build = BuildRecord::pending(ResourceId::new());
        build.mark_running().unwrap();
        build.finish(BuildStatus::Failure).unwrap();

        assert!(build.finish(BuildStatus::Success).is_err());
        assert!(build.mark_running().is_err());
        assert_eq!(build.status, BuildStatus::Failure);
    }

    #[test]
    fn test_running_is_entered_once() {
        let mut build = BuildRecord::pending(ResourceId::new());
        build.mark_running().unwrap();
        assert!(build.mark_running().is_err());
        assert!(build.finish(BuildStatus::Running).is_err());
    }

    #[test]
    fn test_status_json() {
        assert_eq!(
            serde_json::to_string(&BuildStatus::Failure).unwrap(),
            "\"failure\""
        );
    }
}
