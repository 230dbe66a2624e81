//! Failover execution
//!
//! Runs one generation against the requester's candidates strictly in
//! order, one attempt each, and records every outcome on the credential
//! that produced it. Per-candidate failures never reach the caller; only
//! exhaustion does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

use super::credential::Candidate;
use super::pool::PoolSelector;
use super::strategy::{FirstRequested, ModelSelection};
use crate::db::{Credential, CredentialPatch, CredentialStore, CryptoError};
use crate::error::PoolError;
use crate::schemas::gemini::models::GEMINI_2_0_FLASH;
use crate::services::provider::{ErrorClass, GenerativeProvider, ProviderError};
use crate::utils::{bound_error_text, with_timeout};

// ============================================================================
// Request / Response
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Only the first entry is exercised
    #[serde(default)]
    pub models: Vec<String>,
}

impl GenerateOptions {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            models: vec![model.into()],
        }
    }
}

/// Uniform generation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub model: String,
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Used when the request names no model
    pub default_model: String,

    /// Bound on each provider call
    pub attempt_timeout: Duration,

    /// Checkout lease taken before each stored-candidate attempt
    pub checkout_lease: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_model: GEMINI_2_0_FLASH.to_string(),
            attempt_timeout: Duration::from_secs(60),
            checkout_lease: Duration::from_secs(90),
        }
    }
}

impl ExecutorConfig {
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_checkout_lease(mut self, lease: Duration) -> Self {
        self.checkout_lease = lease;
        self
    }
}

// ============================================================================
// Attempt Errors
// ============================================================================

#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Cannot decrypt secret: {0}")]
    Secret(#[from] CryptoError),
}

impl AttemptError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Provider(e) => e.classify(),
            Self::Secret(_) => ErrorClass::Other,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Provider(e) => e.retry_after(),
            Self::Secret(_) => None,
        }
    }
}

enum Checkout {
    /// Lease taken, ending at this instant
    Held(DateTime<Utc>),
    /// Another executor holds an unexpired lease
    Busy,
    /// The store could not answer; the attempt proceeds without a lease
    Unknown,
}

// ============================================================================
// Failover Executor
// ============================================================================

pub struct FailoverExecutor {
    selector: PoolSelector,
    store: CredentialStore,
    provider: Arc<dyn GenerativeProvider>,
    model_selection: Arc<dyn ModelSelection>,
    config: ExecutorConfig,
}

impl FailoverExecutor {
    pub fn new(selector: PoolSelector, provider: Arc<dyn GenerativeProvider>, config: ExecutorConfig) -> Self {
        Self {
            store: selector.store().clone(),
            selector,
            provider,
            model_selection: Arc::new(FirstRequested),
            config,
        }
    }

    pub fn with_model_selection(mut self, strategy: Arc<dyn ModelSelection>) -> Self {
        self.model_selection = strategy;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        requester_id: &str,
    ) -> Result<Generation, PoolError> {
        let candidates = self.selector.select_candidates(requester_id).await?;
        if candidates.is_empty() {
            tracing::warn!(requester = %requester_id, "No credentials available");
            return Err(PoolError::NoCredentialsAvailable);
        }

        let model = self
            .model_selection
            .select(&options.models, &self.config.default_model);

        // (candidate, already deferred once)
        let mut queue: VecDeque<(Candidate, bool)> =
            candidates.into_iter().map(|c| (c, false)).collect();
        let mut attempts = 0usize;
        let mut last_error = String::new();

        while let Some((candidate, deferred)) = queue.pop_front() {
            let mut lease = None;
            if let Candidate::Stored(credential) = &candidate {
                match self.checkout(credential).await {
                    Checkout::Held(until) => lease = Some(until),
                    Checkout::Busy if !deferred => {
                        tracing::debug!(credential_id = %credential.id, "Credential leased elsewhere, deferring");
                        queue.push_back((candidate, true));
                        continue;
                    }
                    Checkout::Busy | Checkout::Unknown => {}
                }
            }

            attempts += 1;
            tracing::debug!(
                requester = %requester_id,
                credential_id = candidate.id().unwrap_or("fallback"),
                model = %model,
                attempt = attempts,
                "Attempting generation"
            );

            match self.attempt(&candidate, &model, prompt).await {
                Ok(text) => {
                    if let Candidate::Stored(credential) = &candidate {
                        self.record_success(credential, lease).await;
                    }
                    tracing::info!(
                        requester = %requester_id,
                        credential_id = candidate.id().unwrap_or("fallback"),
                        model = %model,
                        attempt = attempts,
                        "Generation succeeded"
                    );
                    return Ok(Generation { text, model });
                }
                Err(err) => {
                    last_error = bound_error_text(&err);
                    match &candidate {
                        Candidate::Stored(credential) => {
                            self.record_failure(credential, &err, lease).await
                        }
                        Candidate::Fallback(_) => tracing::warn!(
                            classification = %err.class(),
                            error = %last_error,
                            "Fallback secret failed"
                        ),
                    }
                }
            }
        }

        tracing::warn!(
            requester = %requester_id,
            attempts,
            last_error = %last_error,
            "Credential pool exhausted"
        );
        Err(PoolError::PoolExhausted { attempts, last_error })
    }

    async fn attempt(&self, candidate: &Candidate, model: &str, prompt: &str) -> Result<String, AttemptError> {
        let decrypted: Zeroizing<String>;
        let secret = match candidate {
            Candidate::Stored(credential) => {
                decrypted = self.store.decrypt_secret(credential)?;
                decrypted.as_str()
            }
            Candidate::Fallback(fallback) => fallback.expose(),
        };

        with_timeout(
            self.config.attempt_timeout,
            self.provider.generate(secret, model, prompt),
        )
        .await
        .map_err(|e| AttemptError::Provider(e.flatten(ProviderError::Timeout)))
    }

    async fn checkout(&self, credential: &Credential) -> Checkout {
        let now = Utc::now();
        let lease_until = lease_deadline(now, self.config.checkout_lease);
        match self.store.checkout(&credential.id, now, lease_until).await {
            Ok(true) => Checkout::Held(lease_until),
            Ok(false) => Checkout::Busy,
            Err(e) => {
                tracing::warn!(credential_id = %credential.id, error = %e, "Checkout failed");
                Checkout::Unknown
            }
        }
    }

    async fn record_success(&self, credential: &Credential, lease: Option<DateTime<Utc>>) {
        let patch = CredentialPatch::success(Utc::now()).releasing_lease(lease);
        self.persist(credential, &patch).await;
    }

    async fn record_failure(
        &self,
        credential: &Credential,
        err: &AttemptError,
        lease: Option<DateTime<Utc>>,
    ) {
        let now = Utc::now();
        let class = err.class();
        let error_text = bound_error_text(err);

        let patch = match class {
            ErrorClass::Quota => {
                let reset_at = err.retry_after().map(|delay| lease_deadline(now, delay));
                tracing::warn!(
                    credential_id = %credential.id,
                    classification = %class,
                    reset_at = ?reset_at,
                    "Credential quota exceeded"
                );
                CredentialPatch::quota_exceeded(error_text, reset_at)
            }
            ErrorClass::AuthInvalid => {
                tracing::warn!(
                    credential_id = %credential.id,
                    classification = %class,
                    "Credential revoked"
                );
                CredentialPatch::revoked(error_text)
            }
            ErrorClass::Other => {
                tracing::debug!(
                    credential_id = %credential.id,
                    classification = %class,
                    error = %error_text,
                    "Transient provider failure"
                );
                CredentialPatch::transient_failure(error_text)
            }
        };

        self.persist(credential, &patch.releasing_lease(lease)).await;
    }

    async fn persist(&self, credential: &Credential, patch: &CredentialPatch) {
        match self.store.update_fields(&credential.id, patch).await {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(
                credential_id = %credential.id,
                "Credential removed before its transition was recorded"
            ),
            Err(e) => tracing::warn!(
                credential_id = %credential.id,
                error = %e,
                "Failed to persist credential transition"
            ),
        }
    }
}

fn lease_deadline(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|span| now.checked_add_signed(span))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============================================================================
// Tests
// ============================================================================
