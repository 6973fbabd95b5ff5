//! Dashboard notifications.

use laneci_core::{Notification, NotificationPriority};
use laneci_store::NotificationRepo;
use std::sync::Arc;
use tracing::debug;

use crate::ServiceResult;

#[derive(Clone)]
pub struct NotificationService {
    repo: Arc<dyn NotificationRepo>,
}

impl NotificationService {
    pub fn new(repo: Arc<dyn NotificationRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> ServiceResult<Vec<Notification>> {
        Ok(self.repo.list().await?)
    }

    /// `None` when a notification with this name is already posted.
    pub async fn create(
        &self,
        priority: NotificationPriority,
        name: &str,
        message: &str,
    ) -> ServiceResult<Option<Notification>> {
        let created = self
            .repo
            .create(Notification::new(priority, name, message))
            .await?;
        if created.is_none() {
            debug!(%name, "Notification already posted");
        }
        Ok(created)
    }

    pub async fn update(&self, notification: Notification) -> ServiceResult<Notification> {
        Ok(self.repo.update(notification).await?)
    }

    pub async fn delete(&self, name: &str) -> ServiceResult<usize> {
        Ok(self.repo.delete(name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceError;
    use crate::testing::TestEnv;
    use laneci_store::StoreError;

    #[tokio::test]
    async fn test_notification_lifecycle() {
        let env = TestEnv::new();
        let notifications = env.services.notifications();

        let created = notifications
            .create(NotificationPriority::High, "disk", "Disk almost full")
            .await
            .unwrap()
            .unwrap();
        assert!(
            notifications
                .create(NotificationPriority::Low, "disk", "again")
                .await
                .unwrap()
                .is_none()
        );

        let updated = notifications
            .update(Notification {
                message: "Disk full".to_string(),
                ..created
            })
            .await
            .unwrap();
        assert!(updated.updated_at.is_some());

        assert_eq!(notifications.delete("disk").await.unwrap(), 1);
        assert_eq!(notifications.delete("disk").await.unwrap(), 0);
        assert!(matches!(
            notifications.update(updated).await,
            Err(ServiceError::Store(StoreError::NotFound(_)))
        ));
    }
}
