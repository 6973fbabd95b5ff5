//! Service error types.

use laneci_config::ConfigError;
use laneci_core::HostingError;
use laneci_runner::RunnerError;
use laneci_store::StoreError;
use thiserror::Error;

use crate::CheckoutError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("runner error: {0}")]
    Runner(RunnerError),

    #[error("hosting error: {0}")]
    Hosting(#[from] HostingError),

    #[error("checkout failed: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("project {0} is disabled")]
    ProjectDisabled(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("setup incomplete: {0}")]
    Setup(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
}

impl From<RunnerError> for ServiceError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Config(e) => ServiceError::Config(e),
            other => ServiceError::Runner(other),
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Store(err.into())
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
