//! User repository.

use async_trait::async_trait;
use laneci_core::{Credential, ResourceId, User};

use crate::layout::USERS_FILE;
use crate::{
    JsonDataSource, PersistenceError, SecretCipher, StoreError, StoreResult, VersionedStore,
};

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, user: User) -> StoreResult<User>;
    async fn get_by_id(&self, id: ResourceId) -> StoreResult<User>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list(&self) -> StoreResult<Vec<User>>;
    async fn update(&self, user: User) -> StoreResult<User>;
    async fn delete(&self, id: ResourceId) -> StoreResult<bool>;
}

/// `users.json` implementation of UserRepo.
///
/// Provider tokens are sealed with the cipher before they reach the file and
/// opened again on every read. Without a cipher, users carrying credentials
/// cannot be written.
pub struct JsonUserRepo {
    source: JsonDataSource<User>,
    cipher: Option<SecretCipher>,
}

impl JsonUserRepo {
    pub fn new(store: VersionedStore, cipher: Option<SecretCipher>) -> Self {
        Self {
            source: JsonDataSource::new(store, USERS_FILE),
            cipher,
        }
    }

    fn seal(&self, mut user: User) -> StoreResult<User> {
        if user.provider_credentials.is_empty() {
            return Ok(user);
        }
        let Some(cipher) = &self.cipher else {
            return Err(PersistenceError::Crypto(
                "no encryption key configured for provider tokens".to_string(),
            )
            .into());
        };
        for credential in &mut user.provider_credentials {
            let sealed = cipher.encrypt(credential.token())?;
            credential.set_token(sealed);
        }
        Ok(user)
    }

    fn open(&self, mut user: User) -> StoreResult<User> {
        for credential in &mut user.provider_credentials {
            if !SecretCipher::is_sealed(credential.token()) {
                continue;
            }
            let Some(cipher) = &self.cipher else {
                return Err(PersistenceError::Crypto(
                    "provider token is sealed but no encryption key is configured".to_string(),
                )
                .into());
            };
            let opened = cipher.decrypt(credential.token())?;
            credential.set_token(opened);
        }
        Ok(user)
    }

    fn open_opt(&self, user: Option<User>) -> StoreResult<Option<User>> {
        user.map(|user| self.open(user)).transpose()
    }
}

#[async_trait]
impl UserRepo for JsonUserRepo {
    async fn create(&self, user: User) -> StoreResult<User> {
        let email = user.email.clone();
        let created = self
            .source
            .create(self.seal(user)?)
            .await?
            .ok_or_else(|| StoreError::Duplicate(format!("user {}", email)))?;
        self.open(created)
    }

    async fn get_by_id(&self, id: ResourceId) -> StoreResult<User> {
        let user = self
            .source
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        self.open(user)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = self.source.find(&User::make_primary_key(email)).await?;
        self.open_opt(user)
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        self.source
            .collection()
            .await?
            .into_iter()
            .map(|user| self.open(user))
            .collect()
    }

    async fn update(&self, user: User) -> StoreResult<User> {
        let updated = self.source.update(self.seal(user)?).await?;
        self.open(updated)
    }

    async fn delete(&self, id: ResourceId) -> StoreResult<bool> {
        match self.source.find_by_id(id).await? {
            Some(user) => Ok(self.source.delete(&User::make_primary_key(&user.email)).await? > 0),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommitIdentity;
    use laneci_core::{GitHubCredential, ProviderType};
    use tempfile::{TempDir, tempdir};

    fn setup(cipher: Option<SecretCipher>) -> (TempDir, VersionedStore, JsonUserRepo) {
        let dir = tempdir().unwrap();
        let store = VersionedStore::new(
            dir.path(),
            "main",
            CommitIdentity::new("laneci-test", "test@laneci.dev"),
        );
        store.init().unwrap();
        let repo = JsonUserRepo::new(store.clone(), cipher);
        (dir, store, repo)
    }

    fn user_with_token(token: &str) -> User {
        let mut user = User::new("ci@acme.dev", "$2b$04$hash");
        user.provider_credentials
            .push(GitHubCredential::new("ci@acme.dev", token).into());
        user
    }

    #[tokio::test]
    async fn test_tokens_are_sealed_on_disk() {
        let (_dir, store, repo) = setup(Some(SecretCipher::from_passphrase("key")));

        let created = repo.create(user_with_token("ghp_plaintext")).await.unwrap();
        let raw = std::fs::read_to_string(store.file_path(USERS_FILE)).unwrap();
        assert!(!raw.contains("ghp_plaintext"));
        assert!(raw.contains("enc:v1:"));

        let token = |user: &User| {
            user.provider_credential(ProviderType::GitHub)
                .unwrap()
                .token()
                .to_string()
        };
        assert_eq!(token(&created), "ghp_plaintext");
        assert_eq!(token(&repo.get_by_id(created.id).await.unwrap()), "ghp_plaintext");
        let found = repo.find_by_email("ci@acme.dev").await.unwrap().unwrap();
        assert_eq!(token(&found), "ghp_plaintext");

        let mut changed = found;
        changed.provider_credentials[0].set_token("ghp_rotated".to_string());
        let updated = repo.update(changed).await.unwrap();
        assert_eq!(token(&updated), "ghp_rotated");

        let raw = std::fs::read_to_string(store.file_path(USERS_FILE)).unwrap();
        assert!(!raw.contains("ghp_rotated"));
        assert!(!raw.contains("ghp_plaintext"));
        assert_eq!(token(&repo.list().await.unwrap()[0]), "ghp_rotated");
    }

    #[tokio::test]
    async fn test_wrong_key_cannot_read_tokens() {
        let (_dir, store, repo) = setup(Some(SecretCipher::from_passphrase("right")));
        repo.create(user_with_token("ghp_plaintext")).await.unwrap();

        let other =
            JsonUserRepo::new(store.clone(), Some(SecretCipher::from_passphrase("wrong")));
        assert!(matches!(
            other.find_by_email("ci@acme.dev").await,
            Err(StoreError::Persistence(PersistenceError::Crypto(_)))
        ));

        let keyless = JsonUserRepo::new(store, None);
        assert!(keyless.find_by_email("ci@acme.dev").await.is_err());
    }

    #[tokio::test]
    async fn test_credentials_need_a_key() {
        let (_dir, store, repo) = setup(None);

        let result = repo.create(user_with_token("ghp_plaintext")).await;
        assert!(matches!(
            result,
            Err(StoreError::Persistence(PersistenceError::Crypto(_)))
        ));
        assert!(!store.file_path(USERS_FILE).exists());

        // Users without credentials need no key.
        repo.create(User::new("dev@acme.dev", "$2b$04$hash"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_plaintext_tokens_are_still_readable() {
        let (_dir, store, repo) = setup(Some(SecretCipher::from_passphrase("key")));
        let legacy = serde_json::to_vec(&vec![user_with_token("ghp_legacy")]).unwrap();
        store
            .write_and_commit(USERS_FILE, &legacy, "legacy users")
            .unwrap();

        let user = repo.find_by_email("ci@acme.dev").await.unwrap().unwrap();
        assert_eq!(
            user.provider_credential(ProviderType::GitHub).unwrap().token(),
            "ghp_legacy"
        );
    }
}
