//! CI users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::{Credential, ProviderCredential, ProviderType};
use crate::{Entity, ResourceId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: ResourceId,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub provider_credentials: Vec<ProviderCredential>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            email: email.into(),
            password_hash: password_hash.into(),
            provider_credentials: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Natural key for users; email comparison is case-insensitive.
    pub fn make_primary_key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// First credential for the given provider.
    pub fn provider_credential(&self, provider: ProviderType) -> Option<&ProviderCredential> {
        self.provider_credentials
            .iter()
            .find(|c| c.provider_type() == provider)
    }
}

impl Entity for User {
    const KIND: &'static str = "user";

    fn id(&self) -> ResourceId {
        self.id
    }

    fn primary_key(&self) -> String {
        Self::make_primary_key(&self.email)
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}
