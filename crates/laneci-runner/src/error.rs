//! Runner error types.

use laneci_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("runner is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("invalid build state: {0}")]
    Transition(#[from] laneci_core::Error),
}

pub type RunnerResult<T> = std::result::Result<T, RunnerError>;
