//! Credential lifecycle administration
//!
//! Add, list, remove, reset and summarize pooled credentials. Every
//! operation authorizes the requester here; callers pass identity only.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::db::{Credential, CredentialPatch, CredentialStatus, CredentialStore, CredentialView, NewCredential};
use crate::error::PoolError;
use crate::services::backend_pool::AdmissionValidator;

// ============================================================================
// Requester
// ============================================================================

/// Identity of whoever is calling the lifecycle API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: String,
    pub is_privileged: bool,
}

impl Requester {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_privileged: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_privileged: true,
        }
    }

    fn may_manage(&self, credential: &Credential) -> bool {
        self.is_privileged || credential.is_owned_by(&self.id)
    }
}

// ============================================================================
// Requests
// ============================================================================

fn default_provider() -> String {
    "gemini".to_string()
}

/// Input to [`LifecycleApi::add`]
#[derive(Clone, Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct AddCredentialRequest {
    #[validate(length(min = 1, message = "secret must not be empty"))]
    pub secret: String,

    #[validate(length(min = 1, max = 100, message = "label must be 1 to 100 characters"))]
    #[zeroize(skip)]
    pub label: String,

    #[serde(default = "default_provider")]
    #[zeroize(skip)]
    pub provider: String,

    /// Honored only for privileged requesters
    #[serde(default)]
    #[zeroize(skip)]
    pub make_global: bool,
}

impl AddCredentialRequest {
    pub fn new(secret: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            secret: secret.into().trim().to_string(),
            label: label.into().trim().to_string(),
            provider: default_provider(),
            make_global: false,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn global(mut self, make_global: bool) -> Self {
        self.make_global = make_global;
        self
    }

    /// Trim secret and label in place; requests built through serde arrive untrimmed
    fn normalize(&mut self) {
        let secret = Zeroizing::new(self.secret.trim().to_string());
        self.secret.zeroize();
        self.secret.push_str(&secret);
        self.label = self.label.trim().to_string();
    }
}

impl fmt::Debug for AddCredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddCredentialRequest")
            .field("secret", &"<redacted>")
            .field("label", &self.label)
            .field("provider", &self.provider)
            .field("make_global", &self.make_global)
            .finish()
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Summary of the credentials a requester can see
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub usable: usize,
    /// Quota-exceeded or rate-limited
    pub quota_limited: usize,
    pub revoked: usize,
}

impl PoolStats {
    fn tally<'a>(credentials: impl IntoIterator<Item = &'a CredentialView>) -> Self {
        credentials.into_iter().fold(Self::default(), |mut stats, c| {
            stats.total += 1;
            match c.status {
                CredentialStatus::Active if c.is_active => stats.usable += 1,
                CredentialStatus::QuotaExceeded | CredentialStatus::RateLimited => stats.quota_limited += 1,
                CredentialStatus::Revoked => stats.revoked += 1,
                _ => {}
            }
            stats
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.usable > 0
    }
}

// ============================================================================
// Lifecycle API
// ============================================================================

#[derive(Clone)]
pub struct LifecycleApi {
    store: CredentialStore,
    validator: AdmissionValidator,
}

impl LifecycleApi {
    pub fn new(store: CredentialStore, validator: AdmissionValidator) -> Self {
        Self { store, validator }
    }

    /// Validate input, probe the provider, then persist as active.
    ///
    /// Nothing is written unless the admission probe passes.
    pub async fn add(
        &self,
        mut request: AddCredentialRequest,
        requester: &Requester,
    ) -> Result<CredentialView, PoolError> {
        request.normalize();
        request.validate()?;

        let provider = self.validator.provider_name().to_string();
        if !request.provider.eq_ignore_ascii_case(&provider) {
            return Err(PoolError::ValidationFailed(format!(
                "unsupported provider: {}",
                request.provider
            )));
        }

        if let Err(e) = self.validator.validate(&request.secret).await {
            tracing::info!(requester = %requester.id, label = %request.label, "Credential rejected at admission");
            return Err(e);
        }

        let is_global = request.make_global && requester.is_privileged;
        if request.make_global && !is_global {
            tracing::debug!(requester = %requester.id, "Global flag ignored for unprivileged requester");
        }

        let saved = self
            .store
            .save(
                NewCredential::admitted(
                    request.label.as_str(),
                    provider,
                    Some(requester.id.clone()),
                    is_global,
                ),
                &request.secret,
            )
            .await?;

        tracing::info!(
            credential_id = %saved.id,
            requester = %requester.id,
            is_global,
            "Credential admitted"
        );

        Ok(saved.view())
    }

    /// Privileged: own plus shared (global or ownerless). Otherwise own only.
    pub async fn list(&self, requester: &Requester) -> Result<Vec<CredentialView>, PoolError> {
        let mut credentials = self.store.find_owned(&requester.id).await?;

        if requester.is_privileged {
            let seen: HashSet<String> = credentials.iter().map(|c| c.id.clone()).collect();
            credentials.extend(
                self.store
                    .find_shared()
                    .await?
                    .into_iter()
                    .filter(|c| !seen.contains(&c.id)),
            );
        }

        credentials.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(credentials.iter().map(Credential::view).collect())
    }

    pub async fn remove(&self, id: &str, requester: &Requester) -> Result<(), PoolError> {
        let credential = self.authorized(id, requester).await?;

        if !self.store.delete(&credential.id).await? {
            return Err(PoolError::NotFound(id.to_string()));
        }

        tracing::info!(credential_id = %id, requester = %requester.id, "Credential removed");
        Ok(())
    }

    /// Back to active with a cleared error count. `last_error` and usage survive.
    pub async fn reset(&self, id: &str, requester: &Requester) -> Result<CredentialView, PoolError> {
        self.authorized(id, requester).await?;

        let updated = self
            .store
            .update_fields(id, &CredentialPatch::reset())
            .await?
            .ok_or_else(|| PoolError::NotFound(id.to_string()))?;

        tracing::info!(credential_id = %id, requester = %requester.id, "Credential reset");
        Ok(updated.view())
    }

    /// Run the admission probe alone; nothing is persisted
    pub async fn validate(&self, secret: &str) -> Result<(), PoolError> {
        self.validator.validate(secret.trim()).await
    }

    pub async fn stats(&self, requester: &Requester) -> Result<PoolStats, PoolError> {
        Ok(PoolStats::tally(&self.list(requester).await?))
    }

    async fn authorized(&self, id: &str, requester: &Requester) -> Result<Credential, PoolError> {
        let credential = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| PoolError::NotFound(id.to_string()))?;

        if !requester.may_manage(&credential) {
            tracing::warn!(credential_id = %id, requester = %requester.id, "Unauthorized credential access");
            return Err(PoolError::Unauthorized(format!(
                "{} may not manage credential {}",
                requester.id, id
            )));
        }

        Ok(credential)
    }
}

// ============================================================================
// Tests
// ============================================================================
