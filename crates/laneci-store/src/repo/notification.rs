//! Notification repository.

use async_trait::async_trait;
use laneci_core::Notification;

use crate::layout::NOTIFICATIONS_FILE;
use crate::{JsonDataSource, StoreResult, VersionedStore};

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    /// `None` if a notification with the same name already exists.
    async fn create(&self, notification: Notification) -> StoreResult<Option<Notification>>;
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Notification>>;
    async fn list(&self) -> StoreResult<Vec<Notification>>;
    async fn update(&self, notification: Notification) -> StoreResult<Notification>;
    async fn delete(&self, name: &str) -> StoreResult<usize>;
}

/// `notifications.json` implementation of NotificationRepo.
pub struct JsonNotificationRepo {
    source: JsonDataSource<Notification>,
}

impl JsonNotificationRepo {
    pub fn new(store: VersionedStore) -> Self {
        Self {
            source: JsonDataSource::new(store, NOTIFICATIONS_FILE),
        }
    }
}

#[async_trait]
impl NotificationRepo for JsonNotificationRepo {
    async fn create(&self, notification: Notification) -> StoreResult<Option<Notification>> {
        self.source.create(notification).await
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Notification>> {
        self.source.find(name).await
    }

    async fn list(&self) -> StoreResult<Vec<Notification>> {
        self.source.collection().await
    }

    async fn update(&self, notification: Notification) -> StoreResult<Notification> {
        self.source.update(notification).await
    }

    async fn delete(&self, name: &str) -> StoreResult<usize> {
        self.source.delete(name).await
    }
}
