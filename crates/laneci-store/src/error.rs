//! Store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("remote sync error: {0}")]
    RemoteSync(#[from] RemoteSyncError),
}

/// Reading, writing or committing a file failed. Never retried automatically.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("secret error: {0}")]
    Crypto(String),
}

/// Synchronizing with the remote failed. Conflicts are left for the caller.
#[derive(Debug, Error)]
pub enum RemoteSyncError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("push of {reference} rejected: {message}")]
    Rejected { reference: String, message: String },

    #[error("local and remote history diverged on {0}")]
    Diverged(String),

    #[error("working copy has uncommitted changes")]
    DirtyWorkingCopy,

    #[error("remote '{0}' is not configured")]
    MissingRemote(String),

    #[error("git error: {0}")]
    Git(git2::Error),
}

impl From<git2::Error> for RemoteSyncError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::Auth => RemoteSyncError::Authentication(err.message().to_string()),
            git2::ErrorCode::NotFastForward => RemoteSyncError::Rejected {
                reference: String::new(),
                message: err.message().to_string(),
            },
            _ => RemoteSyncError::Git(err),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Persistence(err.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Persistence(err.into())
    }
}

impl From<git2::Error> for StoreError {
    fn from(err: git2::Error) -> Self {
        StoreError::Persistence(err.into())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Persistence(PersistenceError::Task(err.to_string()))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
