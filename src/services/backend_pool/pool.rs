//! Pool selection
//!
//! Builds the ordered candidate list for one requester: owned credentials
//! first, then shared ones, each tier least-recently-used first.

use chrono::Utc;
use std::cmp::Ordering;

use super::credential::{Candidate, FallbackSecret};
use crate::db::{Credential, CredentialStore, StoreError};

// ============================================================================
// Pool Configuration
// ============================================================================

/// Configuration for pool selection
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Used only when the requester's pool is empty
    pub fallback_secret: Option<FallbackSecret>,

    /// Admit quota-limited credentials whose reset hint has passed
    pub auto_recover_quota: bool,
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback_secret(mut self, secret: impl Into<String>) -> Self {
        self.fallback_secret = Some(FallbackSecret::new(secret));
        self
    }

    pub fn with_auto_recover_quota(mut self, enabled: bool) -> Self {
        self.auto_recover_quota = enabled;
        self
    }
}

// ============================================================================
// Pool Selector
// ============================================================================

#[derive(Clone)]
pub struct PoolSelector {
    store: CredentialStore,
    config: PoolConfig,
}

impl PoolSelector {
    pub fn new(store: CredentialStore, config: PoolConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Ordered candidates for `requester_id`.
    ///
    /// A global credential the requester owns is listed once, in the owned
    /// tier. The fallback secret appears only when nothing else qualifies.
    pub async fn select_candidates(&self, requester_id: &str) -> Result<Vec<Candidate>, StoreError> {
        let (mut owned, mut shared) = if self.config.auto_recover_quota {
            let now = Utc::now();
            let eligible = |c: &Credential| c.is_usable() || c.is_recoverable(now);

            let mut owned = self.store.find_owned(requester_id).await?;
            let mut shared = self.store.find_shared().await?;
            owned.retain(eligible);
            shared.retain(eligible);
            (owned, shared)
        } else {
            (
                self.store.find_owned_active(requester_id).await?,
                self.store.find_shared_active().await?,
            )
        };

        shared.retain(|c| !c.is_owned_by(requester_id));
        owned.sort_by(least_recently_used);
        shared.sort_by(least_recently_used);

        let owned_count = owned.len();
        let mut candidates: Vec<Candidate> = owned
            .into_iter()
            .chain(shared)
            .map(Candidate::Stored)
            .collect();

        if candidates.is_empty() {
            if let Some(fallback) = &self.config.fallback_secret {
                tracing::debug!(requester = %requester_id, "Pool empty, using fallback secret");
                candidates.push(Candidate::Fallback(fallback.clone()));
            }
        }

        tracing::debug!(
            requester = %requester_id,
            owned = owned_count,
            total = candidates.len(),
            "Selected candidates"
        );

        Ok(candidates)
    }
}

/// Never-used first, then oldest use; creation time and id break ties
fn least_recently_used(a: &Credential, b: &Credential) -> Ordering {
    a.last_used_at
        .cmp(&b.last_used_at)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

// ============================================================================
// Tests
// ============================================================================
