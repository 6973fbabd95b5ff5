//! Users, logins and provider credentials.

use laneci_core::{Credential, ProviderCredential, ResourceId, User};
use laneci_store::UserRepo;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{ServiceError, ServiceResult};

const HASH_COST: u32 = if cfg!(test) { 4 } else { bcrypt::DEFAULT_COST };

/// bcrypt hash with a fresh random salt.
pub fn hash_password(password: &str) -> ServiceResult<String> {
    Ok(bcrypt::hash(password, HASH_COST)?)
}

/// Constant-time check of `password` against a bcrypt hash. Malformed hashes never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

/// [`hash_password`] on the blocking pool.
pub(crate) async fn hash_password_blocking(password: &str) -> ServiceResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

async fn verify_password_blocking(password: &str, stored: &str) -> ServiceResult<bool> {
    let (password, stored) = (password.to_string(), stored.to_string());
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &stored)).await?)
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepo>,
    ci_user_email: Option<String>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepo>, ci_user_email: Option<String>) -> Self {
        Self {
            repo,
            ci_user_email,
        }
    }

    pub async fn list(&self) -> ServiceResult<Vec<User>> {
        Ok(self.repo.list().await?)
    }

    pub async fn get(&self, id: ResourceId) -> ServiceResult<User> {
        Ok(self.repo.get_by_id(id).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        Ok(self.repo.find_by_email(email).await?)
    }

    pub async fn create(&self, email: &str, password: &str) -> ServiceResult<User> {
        let email = email.trim();
        if !email.contains('@') {
            return Err(ServiceError::InvalidInput(format!(
                "'{}' is not an email address",
                email
            )));
        }
        if password.is_empty() {
            return Err(ServiceError::InvalidInput("password must not be empty".to_string()));
        }

        let user = self
            .repo
            .create(User::new(email, hash_password_blocking(password).await?))
            .await?;
        info!(user_id = %user.id, email = %user.email, "Created user");
        Ok(user)
    }

    pub async fn update(&self, user: User) -> ServiceResult<User> {
        Ok(self.repo.update(user).await?)
    }

    pub async fn change_password(&self, id: ResourceId, password: &str) -> ServiceResult<User> {
        if password.is_empty() {
            return Err(ServiceError::InvalidInput("password must not be empty".to_string()));
        }
        let mut user = self.repo.get_by_id(id).await?;
        user.password_hash = hash_password_blocking(password).await?;
        Ok(self.repo.update(user).await?)
    }

    pub async fn delete(&self, id: ResourceId) -> ServiceResult<bool> {
        Ok(self.repo.delete(id).await?)
    }

    /// The user with this email and password.
    pub async fn login(&self, email: &str, password: &str) -> ServiceResult<User> {
        if let Some(user) = self.repo.find_by_email(email).await? {
            if verify_password_blocking(password, &user.password_hash).await? {
                info!(user_id = %user.id, "User logged in");
                return Ok(user);
            }
        }
        warn!(email = %email, "Failed login attempt");
        Err(ServiceError::InvalidCredentials)
    }

    /// The account builds authenticate as.
    pub async fn ci_user(&self) -> ServiceResult<User> {
        let email = self
            .ci_user_email
            .as_deref()
            .ok_or_else(|| ServiceError::Setup("no CI user configured".to_string()))?;
        self.repo
            .find_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("CI user {}", email)))
    }

    pub async fn add_credential(
        &self,
        user_id: ResourceId,
        credential: ProviderCredential,
    ) -> ServiceResult<User> {
        let mut user = self.repo.get_by_id(user_id).await?;
        if user
            .provider_credentials
            .iter()
            .any(|c| c.id() == credential.id())
        {
            return Err(ServiceError::InvalidInput(format!(
                "credential {} already exists",
                credential.id()
            )));
        }
        info!(
            user_id = %user.id,
            provider = credential.provider_name(),
            "Adding provider credential"
        );
        user.provider_credentials.push(credential);
        Ok(self.repo.update(user).await?)
    }

    /// Replace the credential with the same id.
    pub async fn update_credential(
        &self,
        user_id: ResourceId,
        credential: ProviderCredential,
    ) -> ServiceResult<User> {
        let mut user = self.repo.get_by_id(user_id).await?;
        let slot = user
            .provider_credentials
            .iter_mut()
            .find(|c| c.id() == credential.id())
            .ok_or_else(|| ServiceError::NotFound(format!("credential {}", credential.id())))?;
        *slot = credential;
        Ok(self.repo.update(user).await?)
    }

    pub async fn remove_credential(
        &self,
        user_id: ResourceId,
        credential_id: ResourceId,
    ) -> ServiceResult<User> {
        let mut user = self.repo.get_by_id(user_id).await?;
        let before = user.provider_credentials.len();
        user.provider_credentials.retain(|c| c.id() != credential_id);
        if user.provider_credentials.len() == before {
            return Err(ServiceError::NotFound(format!("credential {}", credential_id)));
        }
        Ok(self.repo.update(user).await?)
    }
}
