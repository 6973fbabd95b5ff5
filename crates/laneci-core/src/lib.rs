//! Core domain types and traits for the laneci CI server.
//!
//! This crate contains:
//! - Resource identifiers and the `Entity` contract shared by every JSON collection
//! - Users, provider credentials, projects and notifications
//! - Build records and their output rows
//! - The lane engine and remote hosting traits

pub mod artifact;
pub mod build;
pub mod credential;
pub mod engine;
pub mod entity;
pub mod error;
pub mod hosting;
pub mod id;
pub mod notification;
pub mod output;
pub mod project;
pub mod user;

pub use artifact::Artifact;
pub use build::{BuildError, BuildParameters, BuildRecord, BuildStatus};
pub use credential::{Credential, GitHubCredential, ProviderCredential, ProviderType};
pub use engine::{EngineError, LaneEngine, LaneInvocation, OutputEvent, OutputSink};
pub use entity::Entity;
pub use error::{Error, Result};
pub use hosting::{HostingError, RemoteHosting, RepoHandle};
pub use id::ResourceId;
pub use notification::{Notification, NotificationPriority};
pub use output::{BuildRunnerOutputRow, RowType};
pub use project::{Project, RepoConfig};
pub use user::User;
