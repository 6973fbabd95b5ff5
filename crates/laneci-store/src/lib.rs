//! Persistence layer for laneci.
//!
//! All CI state lives as JSON files in a git working copy, so every change is a
//! commit in the configuration repository. This crate provides:
//! - [`VersionedStore`], the working copy itself
//! - [`JsonDataSource`], a locked read-modify-write collection over one JSON file
//! - Repository traits and JSON implementations for each entity
//! - [`SecretCipher`], sealing provider tokens at rest

pub mod error;
pub mod json;
pub mod layout;
pub mod repo;
pub mod secret;
pub mod versioned;

pub use error::{PersistenceError, RemoteSyncError, StoreError, StoreResult};
pub use json::JsonDataSource;
pub use repo::*;
pub use secret::SecretCipher;
pub use versioned::{CommitIdentity, LockedStore, PullOutcome, VersionedStore};
