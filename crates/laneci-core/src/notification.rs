//! Dashboard notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Entity, ResourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A notification, unique by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: ResourceId,
    pub priority: NotificationPriority,
    pub name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(
        priority: NotificationPriority,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: ResourceId::new(),
            priority,
            name: name.into(),
            message: message.into(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

impl Entity for Notification {
    const KIND: &'static str = "notification";

    fn id(&self) -> ResourceId {
        self.id
    }

    fn primary_key(&self) -> String {
        self.name.clone()
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}
