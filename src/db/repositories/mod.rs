//! Repository pattern implementations
//!
//! Persistence backends for the credential collection. Repositories only
//! ever see sealed secrets; encryption happens in [`crate::db::CredentialStore`].

pub mod credential;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::cipher::CryptoError;
use crate::db::models::{Credential, CredentialPatch};

pub use credential::DynamoDbCredentialRepository;
pub use memory::InMemoryCredentialRepository;

/// Persistence backend for credentials
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Insert a new record; fails with [`StoreError::Conflict`] if the id exists
    async fn insert(&self, credential: &Credential) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Credential>, StoreError>;

    /// Every credential owned by `owner_id`, whatever its status
    async fn find_owned(&self, owner_id: &str) -> Result<Vec<Credential>, StoreError>;

    /// Every global or ownerless credential, whatever its status
    async fn find_shared(&self) -> Result<Vec<Credential>, StoreError>;

    async fn find_owned_active(&self, owner_id: &str) -> Result<Vec<Credential>, StoreError> {
        let mut found = self.find_owned(owner_id).await?;
        found.retain(Credential::is_usable);
        Ok(found)
    }

    async fn find_shared_active(&self) -> Result<Vec<Credential>, StoreError> {
        let mut found = self.find_shared().await?;
        found.retain(Credential::is_usable);
        Ok(found)
    }

    /// Apply a partial update; `Ok(None)` when the record does not exist
    async fn update_fields(
        &self,
        id: &str,
        patch: &CredentialPatch,
    ) -> Result<Option<Credential>, StoreError>;

    /// Take a short lease on the credential.
    ///
    /// Succeeds only if no unexpired lease is held at `now`; returns
    /// `Ok(false)` when another executor holds it or the record is gone.
    async fn checkout(
        &self,
        id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Returns whether a record was removed
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Errors that can occur during credential persistence
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Credential already exists: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
