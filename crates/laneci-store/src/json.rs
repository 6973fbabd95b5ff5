//! Locked read-modify-write collections over one JSON file.

use chrono::Utc;
use laneci_core::{Entity, ResourceId};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{StoreError, StoreResult, VersionedStore};

/// One JSON array of `E` in the working copy.
///
/// Every mutation reads the file, applies the change and commits while holding
/// both the collection lock and the working-copy lock, so a concurrent pull can
/// neither be overwritten nor slip in between. The cache is replaced only once
/// the write and commit went through.
pub struct JsonDataSource<E: Entity> {
    store: VersionedStore,
    relative_path: PathBuf,
    cache: Mutex<Option<Vec<E>>>,
}

impl<E: Entity> JsonDataSource<E> {
    pub fn new(store: VersionedStore, relative_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            relative_path: relative_path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Re-read the file. A missing file is an empty collection.
    pub async fn collection(&self) -> StoreResult<Vec<E>> {
        let mut cache = self.cache.lock().await;
        let (entities, ()) = self.transact(|_| Ok(((), None))).await?;
        *cache = Some(entities.clone());
        Ok(entities)
    }

    /// The cached collection, loading it on first use.
    pub async fn cached(&self) -> StoreResult<Vec<E>> {
        let mut cache = self.cache.lock().await;
        if let Some(entities) = cache.as_ref() {
            return Ok(entities.clone());
        }
        let (entities, ()) = self.transact(|_| Ok(((), None))).await?;
        *cache = Some(entities.clone());
        Ok(entities)
    }

    /// Replace the whole collection in one commit.
    pub async fn set_collection(&self, entities: Vec<E>) -> StoreResult<()> {
        let mut cache = self.cache.lock().await;
        ensure_unique(&entities)?;
        let (written, ()) = self
            .transact(move |working| {
                *working = entities;
                Ok(((), Some(format!("Replace {} collection", E::KIND))))
            })
            .await?;
        *cache = Some(written);
        Ok(())
    }

    /// Append `entity`. Returns `None` if its primary key or id is already taken.
    pub async fn create(&self, entity: E) -> StoreResult<Option<E>> {
        self.insert_with(move |_| Some(entity)).await
    }

    /// Build the entity from the locked collection and append it.
    ///
    /// Returning `None` from `build` skips the write.
    pub async fn insert_with<F>(&self, build: F) -> StoreResult<Option<E>>
    where
        F: FnOnce(&[E]) -> Option<E> + Send + 'static,
    {
        let mut cache = self.cache.lock().await;
        let (working, created) = self
            .transact(move |working| {
                let Some(entity) = build(working) else {
                    return Ok((None, None));
                };

                let key = entity.primary_key();
                if working
                    .iter()
                    .any(|e| e.primary_key() == key || e.id() == entity.id())
                {
                    debug!(kind = E::KIND, %key, "Entity already exists, skipping create");
                    return Ok((None, None));
                }

                working.push(entity.clone());
                Ok((Some(entity), Some(format!("Create {} {}", E::KIND, key))))
            })
            .await?;
        *cache = Some(working);
        Ok(created)
    }

    /// Replace the entity with the same primary key and stamp `updated_at`.
    pub async fn update(&self, mut entity: E) -> StoreResult<E> {
        let mut cache = self.cache.lock().await;
        let (working, updated) = self
            .transact(move |working| {
                let key = entity.primary_key();
                let Some(slot) = working.iter_mut().find(|e| e.primary_key() == key) else {
                    return Err(StoreError::NotFound(format!("{} {}", E::KIND, key)));
                };
                entity.touch(Utc::now());
                *slot = entity.clone();
                Ok((entity, Some(format!("Update {} {}", E::KIND, key))))
            })
            .await?;
        *cache = Some(working);
        Ok(updated)
    }

    /// Remove every entity with `primary_key`. Nothing is written when none match.
    pub async fn delete(&self, primary_key: &str) -> StoreResult<usize> {
        let mut cache = self.cache.lock().await;
        let primary_key = primary_key.to_string();
        let (working, removed) = self
            .transact(move |working| {
                let before = working.len();
                working.retain(|e| e.primary_key() != primary_key);
                let removed = before - working.len();

                let message =
                    (removed > 0).then(|| format!("Delete {} {}", E::KIND, primary_key));
                Ok((removed, message))
            })
            .await?;
        *cache = Some(working);
        Ok(removed)
    }

    pub async fn find(&self, primary_key: &str) -> StoreResult<Option<E>> {
        let entities = self.collection().await?;
        Ok(entities.into_iter().find(|e| e.primary_key() == primary_key))
    }

    pub async fn find_by_id(&self, id: ResourceId) -> StoreResult<Option<E>> {
        let entities = self.collection().await?;
        Ok(entities.into_iter().find(|e| e.id() == id))
    }

    /// Read the file under the working-copy lock, apply `change` and, when it
    /// returns a commit message, write and commit before the lock is released.
    ///
    /// Returns the collection as it now is on disk.
    async fn transact<T, F>(&self, change: F) -> StoreResult<(Vec<E>, T)>
    where
        T: Send + 'static,
        F: FnOnce(&mut Vec<E>) -> StoreResult<(T, Option<String>)> + Send + 'static,
    {
        let store = self.store.clone();
        let relative = self.relative_path.clone();
        let (working, value, commit) = tokio::task::spawn_blocking(move || {
            let locked = store.locked();
            let mut working = decode::<E>(locked.read(&relative)?)?;
            let (value, message) = change(&mut working)?;
            let commit = match message {
                Some(message) => {
                    let mut bytes = serde_json::to_vec_pretty(&working)?;
                    bytes.push(b'\n');
                    Some(locked.write_and_commit(&relative, &bytes, &message)?)
                }
                None => None,
            };
            Ok::<_, StoreError>((working, value, commit))
        })
        .await??;

        if let Some(commit) = commit {
            debug!(
                kind = E::KIND,
                path = %self.relative_path.display(),
                count = working.len(),
                commit = commit.as_deref().unwrap_or("none"),
                "Wrote collection"
            );
        }
        Ok((working, value))
    }
}

/// Whitespace-only and missing files are empty collections.
fn decode<E: Entity>(bytes: Option<Vec<u8>>) -> StoreResult<Vec<E>> {
    match bytes {
        Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
            Ok(serde_json::from_slice(&bytes)?)
        }
        _ => Ok(Vec::new()),
    }
}

fn ensure_unique<E: Entity>(entities: &[E]) -> StoreResult<()> {
    let mut keys = HashSet::new();
    let mut ids = HashSet::new();
    for entity in entities {
        let key = entity.primary_key();
        if !ids.insert(entity.id()) {
            return Err(StoreError::Duplicate(format!("{} id {}", E::KIND, entity.id())));
        }
        if !keys.insert(key.clone()) {
            return Err(StoreError::Duplicate(format!("{} {}", E::KIND, key)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommitIdentity;
    use laneci_core::{Notification, NotificationPriority};
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};

    fn setup() -> (TempDir, VersionedStore, JsonDataSource<Notification>) {
        let dir = tempdir().unwrap();
        let store = VersionedStore::new(
            dir.path(),
            "main",
            CommitIdentity::new("laneci-test", "test@laneci.dev"),
        );
        store.init().unwrap();
        let source = JsonDataSource::new(store.clone(), "notifications.json");
        (dir, store, source)
    }

    fn notification(name: &str, message: &str) -> Notification {
        Notification::new(NotificationPriority::Normal, name, message)
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let (_dir, _store, source) = setup();
        assert!(source.collection().await.unwrap().is_empty());
        assert!(source.cached().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_dir, store, source) = setup();
        let entities = vec![
            notification("disk-full", "Disk almost full"),
            notification("cert-expiry", "Certificate expires soon"),
        ];
        source.set_collection(entities.clone()).await.unwrap();

        assert_eq!(source.collection().await.unwrap(), entities);

        let raw = std::fs::read_to_string(store.file_path("notifications.json")).unwrap();
        assert!(raw.ends_with("]\n"));

        // A second handle sees the same file.
        let other: JsonDataSource<Notification> =
            JsonDataSource::new(store.clone(), "notifications.json");
        assert_eq!(other.collection().await.unwrap(), entities);
    }

    #[tokio::test]
    async fn test_set_collection_rejects_duplicates() {
        let (_dir, store, source) = setup();
        let result = source
            .set_collection(vec![notification("a", "1"), notification("a", "2")])
            .await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
        assert!(!store.file_path("notifications.json").exists());
    }

    #[tokio::test]
    async fn test_create_is_idempotent_per_key() {
        let (_dir, store, source) = setup();

        let created = source.create(notification("deploy", "first")).await.unwrap();
        assert!(created.is_some());
        let head = store.head();

        let again = source
            .create(notification("deploy", "second"))
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(store.head(), head);

        let all = source.collection().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message, "first");
    }

    #[tokio::test]
    async fn test_update_stamps_and_replaces() {
        let (_dir, _store, source) = setup();
        let mut created = source
            .create(notification("deploy", "old"))
            .await
            .unwrap()
            .unwrap();
        assert!(created.updated_at.is_none());

        created.message = "new".to_string();
        let updated = source.update(created.clone()).await.unwrap();
        assert!(updated.updated_at.is_some());

        let found = source.find("deploy").await.unwrap().unwrap();
        assert_eq!(found.message, "new");
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (_dir, _store, source) = setup();
        let result = source.update(notification("ghost", "boo")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_leaves_file_untouched() {
        let (_dir, store, source) = setup();
        source.create(notification("keep", "me")).await.unwrap();
        let path = store.file_path("notifications.json");
        let before = std::fs::read(&path).unwrap();
        let head = store.head();

        assert_eq!(source.delete("ghost").await.unwrap(), 0);

        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(store.head(), head);
    }

    #[tokio::test]
    async fn test_delete_existing() {
        let (_dir, _store, source) = setup();
        let created = source
            .create(notification("gone", "soon"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(source.delete("gone").await.unwrap(), 1);
        assert!(source.find_by_id(created.id).await.unwrap().is_none());
        assert_eq!(source.delete("gone").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_not_lost() {
        let (_dir, _store, source) = setup();
        let source = Arc::new(source);
        let a = source.create(notification("a", "a0")).await.unwrap().unwrap();
        let b = source.create(notification("b", "b0")).await.unwrap().unwrap();

        let (ra, rb, rc) = tokio::join!(
            source.update(Notification {
                message: "a1".to_string(),
                ..a
            }),
            source.update(Notification {
                message: "b1".to_string(),
                ..b
            }),
            source.create(notification("c", "c0")),
        );
        ra.unwrap();
        rb.unwrap();
        rc.unwrap();

        let all = source.collection().await.unwrap();
        let messages: Vec<_> = all.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(all.len(), 3);
        assert!(messages.contains(&"a1"));
        assert!(messages.contains(&"b1"));
        assert!(messages.contains(&"c0"));
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_cache_and_file() {
        let (dir, store, source) = setup();
        source.create(notification("a", "kept")).await.unwrap();
        let path = store.file_path("notifications.json");
        let before = std::fs::read(&path).unwrap();

        // Without a repository the commit fails after the file was written.
        std::fs::rename(dir.path().join(".git"), dir.path().join(".git-moved")).unwrap();

        let result = source.create(notification("b", "lost")).await;
        assert!(matches!(result, Err(StoreError::Persistence(_))));

        let cached = source.cached().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].name, "a");
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_insert_with_sees_current_collection() {
        let (_dir, _store, source) = setup();
        source.create(notification("n1", "x")).await.unwrap();

        let created = source
            .insert_with(|current| Some(notification(&format!("n{}", current.len() + 1), "y")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.name, "n2");

        let skipped = source.insert_with(|_| None).await.unwrap();
        assert!(skipped.is_none());
        assert_eq!(source.collection().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_updates_of_one_entity() {
        let (_dir, store, source) = setup();
        let source = Arc::new(source);
        let created = source
            .create(notification("deploy", "v0"))
            .await
            .unwrap()
            .unwrap();

        let (first, second) = tokio::join!(
            source.update(Notification {
                message: "v1".to_string(),
                ..created.clone()
            }),
            source.update(Notification {
                message: "v2".to_string(),
                ..created.clone()
            }),
        );
        first.unwrap();
        second.unwrap();

        // The collection lock is fair, so the second caller commits last.
        let all = source.collection().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message, "v2");
        assert_eq!(all[0].id, created.id);

        let other: JsonDataSource<Notification> =
            JsonDataSource::new(store.clone(), "notifications.json");
        assert_eq!(other.find("deploy").await.unwrap().unwrap().message, "v2");
    }

    #[tokio::test]
    async fn test_mutation_waits_for_working_copy_lock() {
        let (_dir, store, source) = setup();
        let source = Arc::new(source);
        let created = source
            .create(notification("deploy", "old"))
            .await
            .unwrap()
            .unwrap();

        // Something else (a pull) holds the working copy and brings in a new entity.
        let locked = store.locked();
        let updater = source.clone();
        let update = tokio::spawn(async move {
            updater
                .update(Notification {
                    message: "new".to_string(),
                    ..created
                })
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!update.is_finished());

        let mut current: Vec<Notification> =
            serde_json::from_slice(&locked.read("notifications.json").unwrap().unwrap()).unwrap();
        current.push(notification("pulled", "from remote"));
        locked
            .write_and_commit(
                "notifications.json",
                &serde_json::to_vec_pretty(&current).unwrap(),
                "pull",
            )
            .unwrap();
        drop(locked);

        update.await.unwrap().unwrap();
        let all = source.collection().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(source.find("deploy").await.unwrap().unwrap().message, "new");
        assert!(source.find("pulled").await.unwrap().is_some());
    }
}
