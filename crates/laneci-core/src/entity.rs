//! Contract shared by every entity persisted in a JSON collection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ResourceId;

/// A record stored in one JSON collection file of the configuration repository.
///
/// `id` is the surface identifier; `primary_key` is the natural key used for
/// duplicate detection and update-in-place. Within one collection neither may repeat.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human readable collection name, used in log lines and commit messages.
    const KIND: &'static str;

    fn id(&self) -> ResourceId;

    fn primary_key(&self) -> String;

    /// Stamp the entity as updated at `at`.
    fn touch(&mut self, at: DateTime<Utc>);
}
