//! Repository traits and their JSON implementations.

pub mod build;
pub mod notification;
pub mod project;
pub mod user;

pub use build::{BuildRepo, JsonBuildRepo};
pub use notification::{JsonNotificationRepo, NotificationRepo};
pub use project::{JsonProjectRepo, ProjectRepo};
pub use user::{JsonUserRepo, UserRepo};
