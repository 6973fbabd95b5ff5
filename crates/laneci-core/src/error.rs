//! Error types for laneci domain validation.

use thiserror::Error;

use crate::build::BuildStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid build transition from {from} to {to}")]
    InvalidTransition { from: BuildStatus, to: BuildStatus },
}

pub type Result<T> = std::result::Result<T, Error>;
