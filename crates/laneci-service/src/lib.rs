//! Services for the laneci CI server.
//!
//! [`Services`] is built once at process start and handed to every caller. It
//! exposes:
//! - [`BuildService`] and the [`WorkerService`] that runs builds in the background
//! - CRUD services for projects, users and notifications
//! - [`OnboardingService`] for first-time setup of the configuration repository
//! - [`SourceCheckout`] and [`GitHubHosting`], the outside-world adapters

pub mod build;
pub mod checkout;
pub mod error;
pub mod github;
pub mod notification;
pub mod onboarding;
pub mod project;
pub mod services;
pub mod user;
pub mod worker;

#[cfg(test)]
mod testing;

pub use build::BuildService;
pub use checkout::{CheckoutError, GitCheckout, LocalWorkspace, SourceCheckout, Workspace};
pub use error::{ServiceError, ServiceResult};
pub use github::GitHubHosting;
pub use notification::NotificationService;
pub use onboarding::OnboardingService;
pub use project::ProjectService;
pub use services::Services;
pub use user::{UserService, hash_password, verify_password};
pub use worker::WorkerService;
