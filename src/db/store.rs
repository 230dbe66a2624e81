//! Credential store
//!
//! Facade over a [`CredentialRepository`] that owns the injected
//! [`SecretCipher`]. Secrets are sealed on `save` and only come back out
//! through [`CredentialStore::decrypt_secret`].

use chrono::{DateTime, Utc};
use std::sync::Arc;
use zeroize::Zeroizing;

use super::cipher::{CryptoError, SecretCipher};
use super::models::{Credential, CredentialPatch, NewCredential};
use super::repositories::{CredentialRepository, StoreError};

#[derive(Clone)]
pub struct CredentialStore {
    repository: Arc<dyn CredentialRepository>,
    cipher: Arc<dyn SecretCipher>,
}

impl CredentialStore {
    pub fn new(repository: Arc<dyn CredentialRepository>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self { repository, cipher }
    }

    /// Seal the secret and persist a new record
    pub async fn save(&self, new: NewCredential, secret: &str) -> Result<Credential, StoreError> {
        let sealed = self.cipher.encrypt(secret.as_bytes())?;
        let credential = Credential {
            id: uuid::Uuid::new_v4().to_string(),
            secret: sealed,
            label: new.label,
            provider: new.provider,
            owner_id: new.owner_id,
            is_global: new.is_global,
            is_active: new.is_active,
            status: new.status,
            usage_count: 0,
            last_used_at: None,
            error_count: 0,
            last_error: None,
            reset_at: None,
            leased_until: None,
            created_at: Utc::now(),
            updated_at: None,
        };

        self.repository.insert(&credential).await?;
        Ok(credential)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        self.repository.get(id).await
    }

    pub async fn find_owned(&self, owner_id: &str) -> Result<Vec<Credential>, StoreError> {
        self.repository.find_owned(owner_id).await
    }

    pub async fn find_shared(&self) -> Result<Vec<Credential>, StoreError> {
        self.repository.find_shared().await
    }

    pub async fn find_owned_active(&self, owner_id: &str) -> Result<Vec<Credential>, StoreError> {
        self.repository.find_owned_active(owner_id).await
    }

    pub async fn find_shared_active(&self) -> Result<Vec<Credential>, StoreError> {
        self.repository.find_shared_active().await
    }

    pub async fn update_fields(
        &self,
        id: &str,
        patch: &CredentialPatch,
    ) -> Result<Option<Credential>, StoreError> {
        self.repository.update_fields(id, patch).await
    }

    pub async fn checkout(
        &self,
        id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.repository.checkout(id, now, lease_until).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.repository.delete(id).await
    }

    /// Plaintext secret for an imminent provider call
    pub(crate) fn decrypt_secret(&self, credential: &Credential) -> Result<Zeroizing<String>, CryptoError> {
        let bytes = self.cipher.decrypt(&credential.secret)?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| CryptoError::Decryption(format!("secret is not UTF-8: {e}")))?;
        Ok(Zeroizing::new(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cipher::{AesGcmCipher, KEY_SIZE};
    use crate::db::models::CredentialStatus;
    use crate::db::repositories::InMemoryCredentialRepository;

    fn store() -> CredentialStore {
        CredentialStore::new(
            Arc::new(InMemoryCredentialRepository::new()),
            Arc::new(AesGcmCipher::new([8u8; KEY_SIZE])),
        )
    }

    #[tokio::test]
    async fn test_save_seals_secret() {
        let store = store();
        let saved = store
            .save(
                NewCredential::admitted("primary", "gemini", Some("alice".to_string()), false),
                "AIza-plain",
            )
            .await
            .unwrap();

        assert_ne!(saved.secret.ciphertext.as_slice(), b"AIza-plain");
        assert_eq!(saved.status, CredentialStatus::Active);
        assert_eq!(&*store.decrypt_secret(&saved).unwrap(), "AIza-plain");

        let fetched = store.find_by_id(&saved.id).await.unwrap().unwrap();
        assert_eq!(fetched.secret, saved.secret);
    }

    #[tokio::test]
    async fn test_decrypt_with_foreign_cipher_fails() {
        let repo: Arc<dyn CredentialRepository> = Arc::new(InMemoryCredentialRepository::new());
        let writer = CredentialStore::new(repo.clone(), Arc::new(AesGcmCipher::new([1u8; KEY_SIZE])));
        let reader = CredentialStore::new(repo, Arc::new(AesGcmCipher::new([2u8; KEY_SIZE])));

        let saved = writer
            .save(NewCredential::admitted("k", "gemini", None, false), "secret")
            .await
            .unwrap();

        assert!(reader.decrypt_secret(&saved).is_err());
    }
}
