//! In-memory credential repository
//!
//! Backs tests and ephemeral runs. Every mutation happens under one write
//! lock, so counter increments and checkouts are atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{CredentialRepository, StoreError};
use crate::db::models::{Credential, CredentialPatch};

#[derive(Debug, Default)]
pub struct InMemoryCredentialRepository {
    records: RwLock<HashMap<String, Credential>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Credential>>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::Unavailable("credential map lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Credential>>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Unavailable("credential map lock poisoned".to_string()))
    }

    fn collect<F>(&self, predicate: F) -> Result<Vec<Credential>, StoreError>
    where
        F: Fn(&Credential) -> bool,
    {
        Ok(self
            .read()?
            .values()
            .filter(|c| predicate(c))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn insert(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut records = self.write()?;
        if records.contains_key(&credential.id) {
            return Err(StoreError::Conflict(credential.id.clone()));
        }
        records.insert(credential.id.clone(), credential.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn find_owned(&self, owner_id: &str) -> Result<Vec<Credential>, StoreError> {
        self.collect(|c| c.is_owned_by(owner_id))
    }

    async fn find_shared(&self) -> Result<Vec<Credential>, StoreError> {
        self.collect(Credential::is_shared)
    }

    async fn update_fields(
        &self,
        id: &str,
        patch: &CredentialPatch,
    ) -> Result<Option<Credential>, StoreError> {
        let mut records = self.write()?;
        let Some(credential) = records.get_mut(id) else {
            return Ok(None);
        };
        patch.apply(credential, Utc::now());
        Ok(Some(credential.clone()))
    }

    async fn checkout(
        &self,
        id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut records = self.write()?;
        match records.get_mut(id) {
            Some(credential) if !credential.is_leased(now) => {
                credential.leased_until = Some(lease_until);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.write()?.remove(id).is_some())
    }
}
