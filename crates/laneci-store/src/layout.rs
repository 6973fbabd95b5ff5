//! File layout inside the configuration working copy.

use laneci_core::ResourceId;
use std::path::PathBuf;

pub const USERS_FILE: &str = "users.json";
pub const PROJECTS_FILE: &str = "projects.json";
pub const NOTIFICATIONS_FILE: &str = "notifications.json";
pub const BUILDS_DIR: &str = "builds";

/// `builds/<project-id>.json`
pub fn builds_file(project_id: ResourceId) -> PathBuf {
    PathBuf::from(BUILDS_DIR).join(format!("{}.json", project_id))
}
