//! First-time setup of the configuration repository.

use laneci_config::Settings;
use laneci_core::{Credential, ProviderCredential, RemoteHosting, RepoHandle, User};
use laneci_store::{ProjectRepo, UserRepo, VersionedStore};
use std::sync::Arc;
use tracing::{info, warn};

use crate::ServiceResult;
use crate::user::hash_password_blocking;

pub struct OnboardingService {
    settings: Arc<Settings>,
    store: VersionedStore,
    hosting: Arc<dyn RemoteHosting>,
    user_repo: Arc<dyn UserRepo>,
    project_repo: Arc<dyn ProjectRepo>,
}

impl OnboardingService {
    pub fn new(
        settings: Arc<Settings>,
        store: VersionedStore,
        hosting: Arc<dyn RemoteHosting>,
        user_repo: Arc<dyn UserRepo>,
        project_repo: Arc<dyn ProjectRepo>,
    ) -> Self {
        Self {
            settings,
            store,
            hosting,
            user_repo,
            project_repo,
        }
    }

    /// Environment variables a complete setup still needs.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        self.settings.missing_keys()
    }

    /// Settings complete, working copy present and the CI user seeded.
    pub async fn correct_setup(&self) -> ServiceResult<bool> {
        if !self.missing_keys().is_empty() || !self.store.exists() {
            return Ok(false);
        }
        let Some(email) = self.settings.ci_user.email.as_deref() else {
            return Ok(false);
        };
        Ok(self.user_repo.find_by_email(email).await?.is_some())
    }

    /// Create the private repository that will hold the configuration.
    pub async fn create_configuration_repository(&self, name: &str) -> ServiceResult<RepoHandle> {
        let repo = self.hosting.create_repository(name, true).await?;
        info!(full_name = %repo.full_name, "Configuration repository created");
        Ok(repo)
    }

    /// Clone the configuration repository, or start a local one when no remote
    /// is configured. Does nothing if the working copy already exists.
    pub async fn trigger_initial_setup(&self) -> ServiceResult<()> {
        if self.store.exists() {
            info!(path = %self.store.root().display(), "Configuration repository already present");
            return Ok(());
        }

        let store = self.store.clone();
        match self.settings.config_repo.url.clone() {
            Some(url) => {
                tokio::task::spawn_blocking(move || store.clone_from_remote(&url)).await??;
            }
            None => {
                warn!("No configuration remote set, initializing a local-only repository");
                tokio::task::spawn_blocking(move || store.init()).await??;
            }
        }
        Ok(())
    }

    /// Write the CI user and, if missing, an empty project list.
    ///
    /// Re-seeding an existing user resets the password and replaces the
    /// credential for the same provider.
    pub async fn seed(
        &self,
        email: &str,
        password: &str,
        credential: Option<ProviderCredential>,
    ) -> ServiceResult<User> {
        let user = match self.user_repo.find_by_email(email).await? {
            Some(mut user) => {
                user.password_hash = hash_password_blocking(password).await?;
                if let Some(credential) = credential {
                    user.provider_credentials
                        .retain(|c| c.provider_type() != credential.provider_type());
                    user.provider_credentials.push(credential);
                }
                self.user_repo.update(user).await?
            }
            None => {
                let mut user = User::new(email.trim(), hash_password_blocking(password).await?);
                user.provider_credentials.extend(credential);
                self.user_repo.create(user).await?
            }
        };
        self.project_repo.ensure_exists().await?;

        info!(user_id = %user.id, email = %user.email, "Seeded CI user");
        Ok(user)
    }
}
