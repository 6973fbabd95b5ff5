//! CLI command implementations.

pub mod builds;
pub mod notifications;
pub mod projects;
pub mod setup;
pub mod sync;
